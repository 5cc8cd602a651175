//! Benchmark runner: measures both backends and prints the comparison.
//!
//! Configuration comes from `BENCH_*` environment variables, optionally
//! provided through a `.env` file in the working directory (see
//! [`crud_bench::config`]).
//!
//! Usage:
//!   cargo run --release
//!   BENCH_RELATIONAL_ENGINE=sqlite BENCH_RUNS=3 cargo run --release

use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use crud_bench::benchmark::{Benchmark, Settings};
use crud_bench::clients::{open_key_value, open_relational};
use crud_bench::config::Config;
use crud_bench::workerpool::{Pool, WorkerPool};
use crud_core::Client;

fn main() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to read .env file: {e}. Exiting.");
            process::exit(1);
        }
    }

    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Invalid configuration: {e:#}. Exiting.");
        process::exit(1);
    });

    crud_core::initialize_logger(config.log_level, config.log_file.as_deref()).unwrap_or_else(
        |e| {
            eprintln!("Failed to initialize logger: {e:#}. Exiting.");
            process::exit(1);
        },
    );

    log::info!(
        "Starting crud-bench v{} ({} workers, {} runs x {} tests)",
        env!("CARGO_PKG_VERSION"),
        config.worker_count,
        config.benchmark.runs,
        config.benchmark.tests
    );

    match run(&config) {
        Ok(true) => log::info!("Benchmark complete."),
        Ok(false) => {
            log::error!("Benchmark finished with failed tasks. Exiting.");
            process::exit(1);
        }
        Err(e) => {
            log::error!("{e:#}. Exiting.");
            process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when the report contains failed tasks.
fn run(config: &Config) -> Result<bool> {
    let pool = Arc::new(WorkerPool::new(config.worker_count));

    let relational = open_relational(&config.relational)?;
    let key_value = open_key_value(&config.redis_address)?;

    {
        let pool = Arc::clone(&pool);
        ctrlc::set_handler(move || {
            log::warn!("Interrupted, stopping worker pool...");
            pool.stop();
        })
        .context("failed to install Ctrl-C handler")?;
    }

    let outcome = measure(
        config.benchmark,
        Arc::clone(&relational),
        Arc::clone(&key_value),
        Arc::clone(&pool),
    );

    // Join the workers first; a stopped run may still have tasks on the clients.
    pool.shutdown();
    for client in [&relational, &key_value] {
        if let Err(e) = client.close() {
            log::error!("Failed to close {} client: {e:#}", client.name());
        }
    }

    outcome
}

fn measure(
    settings: Settings,
    relational: Arc<dyn Client>,
    key_value: Arc<dyn Client>,
    pool: Arc<WorkerPool>,
) -> Result<bool> {
    let bench = Benchmark::new(settings, relational, key_value, pool)
        .context("failed to start benchmark")?;
    let report = bench.run().context("failed to run benchmark")?;
    Ok(!report.has_failures())
}
