//! Process configuration read from environment variables.
//!
//! `main` loads a `.env` file (if present) before calling [`Config::from_env`],
//! so either source works. Every key has a default except where noted.
//!
//! | Variable                   | Default            |
//! |----------------------------|--------------------|
//! | `BENCH_POOL_WORKERS`       | `4` (must be ≥ 1)  |
//! | `BENCH_RUNS`               | `10` (must be ≥ 1) |
//! | `BENCH_TESTS`              | `100`              |
//! | `BENCH_FAIL_FAST`          | `false`            |
//! | `BENCH_RELATIONAL_ENGINE`  | `postgres`         |
//! | `BENCH_SQLITE_PATH`        | `:memory:`         |
//! | `BENCH_POSTGRES_HOST`      | `localhost`        |
//! | `BENCH_POSTGRES_PORT`      | `5432`             |
//! | `BENCH_POSTGRES_USER`      | `postgres`         |
//! | `BENCH_POSTGRES_PASSWORD`  | empty              |
//! | `BENCH_POSTGRES_DATABASE`  | `postgres`         |
//! | `BENCH_POSTGRES_SSLMODE`   | `disable`          |
//! | `BENCH_REDIS_ADDRESS`      | `localhost:6379`   |
//! | `BENCH_LOG_LEVEL`          | `info`             |
//! | `BENCH_LOG_FILE`           | `crud-bench.log`   |

use std::env;
use std::str::FromStr;

use anyhow::{anyhow, bail, Result};
use log::LevelFilter;

use crate::benchmark::Settings;
use crate::clients::postgres::PostgresConfig;

/// Which relational store stands on the relational side of the comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationalEngine {
    Postgres(PostgresConfig),
    /// Path to a database file, or `:memory:`.
    Sqlite(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub worker_count: usize,
    pub benchmark: Settings,
    pub relational: RelationalEngine,
    pub redis_address: String,
    pub log_level: LevelFilter,
    pub log_file: Option<String>,
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name to
    /// its value (or `None` when unset).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let worker_count: usize = parse_or(&var, "BENCH_POOL_WORKERS", 4)?;
        if worker_count == 0 {
            bail!("BENCH_POOL_WORKERS must be at least 1");
        }

        let runs: usize = parse_or(&var, "BENCH_RUNS", 10)?;
        if runs == 0 {
            bail!("BENCH_RUNS must be at least 1");
        }
        let tests: usize = parse_or(&var, "BENCH_TESTS", 100)?;
        let fail_fast = match var("BENCH_FAIL_FAST") {
            Some(value) => parse_bool(&value)
                .ok_or_else(|| anyhow!("BENCH_FAIL_FAST: expected true/false, got {value:?}"))?,
            None => false,
        };

        let engine = var("BENCH_RELATIONAL_ENGINE").unwrap_or_else(|| "postgres".to_string());
        let relational = match engine.to_lowercase().as_str() {
            "postgres" | "postgresql" => RelationalEngine::Postgres(PostgresConfig {
                host: var("BENCH_POSTGRES_HOST").unwrap_or_else(|| "localhost".to_string()),
                port: parse_or(&var, "BENCH_POSTGRES_PORT", 5432)?,
                user: var("BENCH_POSTGRES_USER").unwrap_or_else(|| "postgres".to_string()),
                password: var("BENCH_POSTGRES_PASSWORD").unwrap_or_default(),
                database: var("BENCH_POSTGRES_DATABASE").unwrap_or_else(|| "postgres".to_string()),
                ssl_mode: var("BENCH_POSTGRES_SSLMODE").unwrap_or_else(|| "disable".to_string()),
            }),
            "sqlite" => RelationalEngine::Sqlite(
                var("BENCH_SQLITE_PATH").unwrap_or_else(|| ":memory:".to_string()),
            ),
            other => bail!("BENCH_RELATIONAL_ENGINE: unknown engine {other:?} (expected postgres or sqlite)"),
        };

        let log_level = match var("BENCH_LOG_LEVEL") {
            Some(value) => parse_log_level(&value)
                .ok_or_else(|| anyhow!("BENCH_LOG_LEVEL: unknown level {value:?}"))?,
            None => LevelFilter::Info,
        };
        let log_file = match var("BENCH_LOG_FILE") {
            Some(value) if value.eq_ignore_ascii_case("none") => None,
            Some(value) => Some(value),
            None => Some("crud-bench.log".to_string()),
        };

        Ok(Self {
            worker_count,
            benchmark: Settings {
                runs,
                tests,
                fail_fast,
            },
            relational,
            redis_address: var("BENCH_REDIS_ADDRESS")
                .unwrap_or_else(|| "localhost:6379".to_string()),
            log_level,
            log_file,
        })
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(value) => value
            .parse::<T>()
            .map_err(|e| anyhow!("{key}: invalid value {value:?}: {e}")),
        None => Ok(default),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_log_level(value: &str) -> Option<LevelFilter> {
    match value.to_lowercase().as_str() {
        "off" => Some(LevelFilter::Off),
        "error" => Some(LevelFilter::Error),
        "warn" | "warning" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = load(&[]).unwrap();

        assert_eq!(config.worker_count, 4);
        assert_eq!(config.benchmark.runs, 10);
        assert_eq!(config.benchmark.tests, 100);
        assert!(!config.benchmark.fail_fast);
        assert_eq!(config.redis_address, "localhost:6379");
        assert_eq!(config.log_level, LevelFilter::Info);
        assert_eq!(config.log_file.as_deref(), Some("crud-bench.log"));
        match config.relational {
            RelationalEngine::Postgres(pg) => {
                assert_eq!(pg.host, "localhost");
                assert_eq!(pg.port, 5432);
                assert_eq!(pg.ssl_mode, "disable");
            }
            other => panic!("unexpected engine {other:?}"),
        }
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = load(&[
            ("BENCH_POOL_WORKERS", "8"),
            ("BENCH_RUNS", "3"),
            ("BENCH_TESTS", "5"),
            ("BENCH_FAIL_FAST", "yes"),
            ("BENCH_RELATIONAL_ENGINE", "SQLite"),
            ("BENCH_SQLITE_PATH", "/tmp/bench.db"),
            ("BENCH_REDIS_ADDRESS", "redis://cache:6380/1"),
            ("BENCH_LOG_LEVEL", "debug"),
            ("BENCH_LOG_FILE", "none"),
        ])
        .unwrap();

        assert_eq!(config.worker_count, 8);
        assert_eq!(config.benchmark.runs, 3);
        assert_eq!(config.benchmark.tests, 5);
        assert!(config.benchmark.fail_fast);
        assert_eq!(
            config.relational,
            RelationalEngine::Sqlite("/tmp/bench.db".to_string())
        );
        assert_eq!(config.redis_address, "redis://cache:6380/1");
        assert_eq!(config.log_level, LevelFilter::Debug);
        assert!(config.log_file.is_none());
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = load(&[("BENCH_RUNS", "  "), ("BENCH_POSTGRES_HOST", "")]).unwrap();
        assert_eq!(config.benchmark.runs, 10);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let err = load(&[("BENCH_POOL_WORKERS", "0")]).unwrap_err();
        assert!(err.to_string().contains("BENCH_POOL_WORKERS"));
    }

    #[test]
    fn zero_runs_is_rejected() {
        assert!(load(&[("BENCH_RUNS", "0")]).is_err());
    }

    #[test]
    fn malformed_number_names_the_variable() {
        let err = load(&[("BENCH_TESTS", "many")]).unwrap_err();
        assert!(err.to_string().contains("BENCH_TESTS"));
    }

    #[test]
    fn unknown_engine_is_rejected() {
        assert!(load(&[("BENCH_RELATIONAL_ENGINE", "oracle")]).is_err());
    }

    #[test]
    fn log_level_names_are_case_insensitive() {
        assert_eq!(parse_log_level("WARNING"), Some(LevelFilter::Warn));
        assert_eq!(parse_log_level("Trace"), Some(LevelFilter::Trace));
        assert_eq!(parse_log_level("loud"), None);
    }
}
