//! Benchmark driver: fans CRUD cycles out over the worker pool and times
//! each run per backend.
//!
//! Each task reports its outcome through a channel instead of aborting the
//! process, so one failing call does not discard the measurements already
//! taken. With `fail_fast` set, the first run containing a failure ends the
//! measurement with [`BenchmarkError::Operation`].

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use crossbeam_channel::unbounded;
use crud_core::{Author, Book, Client};
use thiserror::Error;

use crate::report::{Measurement, Report};
use crate::workerpool::{Pool, PoolError};

#[derive(Debug, Error)]
pub enum BenchmarkError {
    #[error("worker pool: {0}")]
    Pool(#[from] PoolError),
    #[error("{backend} run {run}: {cause:#}")]
    Operation {
        backend: &'static str,
        run: usize,
        cause: anyhow::Error,
    },
    #[error("failed to write report: {0}")]
    Output(#[from] io::Error),
}

/// Measurement protocol parameters.
#[derive(Debug, Clone, Copy)]
pub struct Settings {
    /// Timed repetitions per backend.
    pub runs: usize,
    /// Tasks submitted per repetition.
    pub tests: usize,
    /// Abort on the first run that contains a failed task.
    pub fail_fast: bool,
}

pub struct Benchmark {
    settings: Settings,
    relational: Arc<dyn Client>,
    key_value: Arc<dyn Client>,
    pool: Arc<dyn Pool>,
}

impl Benchmark {
    /// Build the driver and start the pool's workers.
    pub fn new(
        settings: Settings,
        relational: Arc<dyn Client>,
        key_value: Arc<dyn Client>,
        pool: Arc<dyn Pool>,
    ) -> Result<Self, BenchmarkError> {
        pool.run()?;

        Ok(Self {
            settings,
            relational,
            key_value,
            pool,
        })
    }

    /// Measure both backends and print the comparison to stdout.
    pub fn run(&self) -> Result<Report, BenchmarkError> {
        let report = self.measure_all()?;
        write_report(&report, &mut io::stdout().lock())?;
        Ok(report)
    }

    /// Measure both backends and write the comparison to `out`.
    pub fn run_to<W: Write>(&self, out: &mut W) -> Result<Report, BenchmarkError> {
        let report = self.measure_all()?;
        write_report(&report, out)?;
        Ok(report)
    }

    fn measure_all(&self) -> Result<Report, BenchmarkError> {
        let mut report = Report::default();

        for client in [&self.relational, &self.key_value] {
            log::info!(
                "Benchmarking {} ({} runs x {} tasks)...",
                client.name(),
                self.settings.runs,
                self.settings.tests
            );
            let measurement = self.measure_client(client)?;
            log::info!(
                "{} done: average {:.2?} per run, {} failed tasks",
                client.name(),
                measurement.average,
                measurement.failed
            );
            report.push(client.name(), measurement);
        }

        Ok(report)
    }

    /// Time `runs` repetitions of `tests` concurrent CRUD cycles against
    /// `client` and return the per-run samples with their mean.
    pub fn measure_client(&self, client: &Arc<dyn Client>) -> Result<Measurement, BenchmarkError> {
        let Settings {
            runs,
            tests,
            fail_fast,
        } = self.settings;
        let backend = client.name();

        let mut samples = Vec::with_capacity(runs);
        let mut failed = 0;
        let (outcome_tx, outcome_rx) = unbounded::<anyhow::Result<()>>();

        for run in 1..=runs {
            let start = Instant::now();

            for code in 1..=tests {
                let client = Arc::clone(client);
                let outcome_tx = outcome_tx.clone();
                self.pool.add(Box::new(move || {
                    let _ = outcome_tx.send(crud_cycle(code, client.as_ref()));
                }))?;
            }
            if let Err(e) = self.pool.wait() {
                log::warn!("{backend} run {run}: pool stopped before the run drained");
                return Err(e.into());
            }

            let elapsed = start.elapsed();
            samples.push(elapsed);

            let mut reported = 0;
            let mut first_error = None;
            let mut run_failed = 0;
            for outcome in outcome_rx.try_iter() {
                reported += 1;
                if let Err(e) = outcome {
                    run_failed += 1;
                    if first_error.is_none() {
                        log::error!("{backend} run {run}: task failed: {e:#}");
                        first_error = Some(e);
                    }
                }
            }
            if reported < tests {
                log::error!(
                    "{backend} run {run}: {} of {tests} tasks reported no outcome",
                    tests - reported
                );
                run_failed += tests - reported;
            }

            log::debug!("{backend} run {run}/{runs}: {elapsed:.2?}, {run_failed} failed");

            if fail_fast && run_failed > 0 {
                return Err(BenchmarkError::Operation {
                    backend,
                    run,
                    cause: first_error
                        .unwrap_or_else(|| anyhow::anyhow!("tasks did not report an outcome")),
                });
            }
            failed += run_failed;
        }

        Ok(Measurement::new(samples, runs * tests, failed))
    }
}

fn write_report<W: Write>(report: &Report, out: &mut W) -> io::Result<()> {
    write!(out, "{report}")?;
    out.flush()
}

/// One benchmark task: a full CRUD cycle for task number `code`.
///
/// Strictly sequential: create author, create book for that author, update
/// both, read both back, delete book then author. Stops at the first error.
pub fn crud_cycle(code: usize, client: &dyn Client) -> anyhow::Result<()> {
    let mut author = Author::sample(code);
    author.id = client.create_author(&author).context("create author")?;

    let mut book = Book::sample(code, author.id);
    book.id = client.create_book(&book).context("create book")?;

    author.name = format!("Author#{code}_updated");
    book.pages += 1;

    client.update_author(&author).context("update author")?;
    client.update_book(&book).context("update book")?;

    client.get_author(author.id).context("get author")?;
    client.get_book(book.id).context("get book")?;

    client.delete_book(book.id).context("delete book")?;
    client.delete_author(author.id).context("delete author")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workerpool::WorkerPool;
    use anyhow::{bail, Result};
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    /// In-process client with optional latency, a failing operation, and a
    /// call log.
    #[derive(Default)]
    struct FakeClient {
        next_id: AtomicI64,
        cycles: AtomicUsize,
        latency: Duration,
        fail_on: Option<&'static str>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl FakeClient {
        fn with_latency(latency: Duration) -> Self {
            Self {
                latency,
                ..Self::default()
            }
        }

        fn failing_on(op: &'static str) -> Self {
            Self {
                fail_on: Some(op),
                ..Self::default()
            }
        }

        fn call(&self, op: &'static str) -> Result<()> {
            self.calls.lock().unwrap().push(op);
            if !self.latency.is_zero() {
                thread::sleep(self.latency);
            }
            if self.fail_on == Some(op) {
                bail!("{op} refused");
            }
            Ok(())
        }
    }

    impl Client for FakeClient {
        fn name(&self) -> &'static str {
            "Fake"
        }

        fn create_author(&self, _author: &Author) -> Result<i64> {
            self.cycles.fetch_add(1, Ordering::SeqCst);
            self.call("create_author")?;
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
        }

        fn get_author(&self, id: i64) -> Result<Author> {
            self.call("get_author")?;
            Ok(Author {
                id,
                ..Author::default()
            })
        }

        fn update_author(&self, _author: &Author) -> Result<()> {
            self.call("update_author")
        }

        fn delete_author(&self, _id: i64) -> Result<()> {
            self.call("delete_author")
        }

        fn create_book(&self, _book: &Book) -> Result<i64> {
            self.call("create_book")?;
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
        }

        fn get_book(&self, id: i64) -> Result<Book> {
            self.call("get_book")?;
            Ok(Book {
                id,
                ..Book::default()
            })
        }

        fn update_book(&self, _book: &Book) -> Result<()> {
            self.call("update_book")
        }

        fn delete_book(&self, _id: i64) -> Result<()> {
            self.call("delete_book")
        }

        fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn settings(runs: usize, tests: usize) -> Settings {
        Settings {
            runs,
            tests,
            fail_fast: false,
        }
    }

    fn benchmark_with(
        settings: Settings,
        relational: Arc<FakeClient>,
        key_value: Arc<FakeClient>,
        workers: usize,
    ) -> Benchmark {
        let pool: Arc<dyn Pool> = Arc::new(WorkerPool::new(workers));
        Benchmark::new(settings, relational, key_value, pool).unwrap()
    }

    #[test]
    fn crud_cycle_runs_operations_in_order() {
        let client = FakeClient::default();
        crud_cycle(1, &client).unwrap();

        assert_eq!(
            *client.calls.lock().unwrap(),
            vec![
                "create_author",
                "create_book",
                "update_author",
                "update_book",
                "get_author",
                "get_book",
                "delete_book",
                "delete_author",
            ]
        );
    }

    #[test]
    fn crud_cycle_stops_at_first_failure() {
        let client = FakeClient::failing_on("update_author");
        let err = crud_cycle(4, &client).unwrap_err();

        assert!(format!("{err:#}").contains("update author"));
        let calls = client.calls.lock().unwrap();
        assert_eq!(calls.last(), Some(&"update_author"));
        assert!(!calls.contains(&"delete_author"));
    }

    #[test]
    fn measure_runs_task_body_runs_times_tests() {
        let client = Arc::new(FakeClient::default());
        let bench = benchmark_with(settings(3, 5), client.clone(), client.clone(), 2);

        let as_dyn: Arc<dyn Client> = client.clone();
        let m = bench.measure_client(&as_dyn).unwrap();

        assert_eq!(client.cycles.load(Ordering::SeqCst), 15);
        assert_eq!(m.samples.len(), 3);
        assert_eq!(m.submitted, 15);
        assert_eq!(m.failed, 0);
    }

    #[test]
    fn average_is_mean_of_run_samples() {
        let client = Arc::new(FakeClient::with_latency(Duration::from_millis(5)));
        let bench = benchmark_with(settings(2, 2), client.clone(), client.clone(), 2);

        let as_dyn: Arc<dyn Client> = client;
        let m = bench.measure_client(&as_dyn).unwrap();

        assert_eq!(m.average, m.total() / 2);
        // Eight sequential calls of 5ms each per task.
        assert!(m.average >= Duration::from_millis(40));
        for sample in &m.samples {
            assert!(*sample >= Duration::from_millis(40));
        }
    }

    #[test]
    fn zero_runs_yield_zero_average() {
        let client = Arc::new(FakeClient::default());
        let bench = benchmark_with(settings(0, 5), client.clone(), client.clone(), 1);

        let as_dyn: Arc<dyn Client> = client.clone();
        let m = bench.measure_client(&as_dyn).unwrap();

        assert!(m.samples.is_empty());
        assert_eq!(m.average, Duration::ZERO);
        assert_eq!(client.cycles.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failures_are_counted_without_aborting() {
        let client = Arc::new(FakeClient::failing_on("create_book"));
        let bench = benchmark_with(settings(2, 3), client.clone(), client.clone(), 2);

        let as_dyn: Arc<dyn Client> = client.clone();
        let m = bench.measure_client(&as_dyn).unwrap();

        assert_eq!(m.samples.len(), 2);
        assert_eq!(m.failed, 6);
        assert_eq!(m.submitted, 6);
        assert!(!client.calls.lock().unwrap().contains(&"delete_book"));
    }

    #[test]
    fn fail_fast_stops_after_first_failing_run() {
        let client = Arc::new(FakeClient::failing_on("get_book"));
        let settings = Settings {
            runs: 4,
            tests: 2,
            fail_fast: true,
        };
        let bench = benchmark_with(settings, client.clone(), client.clone(), 2);

        let as_dyn: Arc<dyn Client> = client.clone();
        let err = bench.measure_client(&as_dyn).unwrap_err();

        match err {
            BenchmarkError::Operation { backend, run, cause } => {
                assert_eq!(backend, "Fake");
                assert_eq!(run, 1);
                assert!(format!("{cause:#}").contains("get book"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(client.cycles.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stopped_pool_surfaces_as_pool_error() {
        let client = Arc::new(FakeClient::default());
        let pool = Arc::new(WorkerPool::new(1));
        let as_pool: Arc<dyn Pool> = pool.clone();
        let bench = Benchmark::new(settings(1, 1), client.clone(), client.clone(), as_pool).unwrap();

        pool.stop();
        let as_dyn: Arc<dyn Client> = client;
        assert!(matches!(
            bench.measure_client(&as_dyn),
            Err(BenchmarkError::Pool(PoolError::Stopped))
        ));
    }

    #[test]
    fn stop_during_run_discards_the_sample() {
        let client = Arc::new(FakeClient::with_latency(Duration::from_millis(40)));
        let pool = Arc::new(WorkerPool::new(2));
        let as_pool: Arc<dyn Pool> = pool.clone();
        let bench = Benchmark::new(settings(1, 2), client.clone(), client.clone(), as_pool).unwrap();

        let stopper = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                pool.stop();
            })
        };

        let as_dyn: Arc<dyn Client> = client;
        let outcome = bench.measure_client(&as_dyn);
        stopper.join().unwrap();

        assert!(matches!(
            outcome,
            Err(BenchmarkError::Pool(PoolError::Stopped))
        ));
        pool.shutdown();
    }

    #[test]
    fn new_rejects_pool_that_already_runs() {
        let client = Arc::new(FakeClient::default());
        let pool: Arc<dyn Pool> = Arc::new(WorkerPool::new(1));
        pool.run().unwrap();

        assert!(matches!(
            Benchmark::new(settings(1, 1), client.clone(), client, pool),
            Err(BenchmarkError::Pool(PoolError::AlreadyStarted))
        ));
    }

    #[test]
    fn run_to_writes_line_per_backend() {
        let bench = benchmark_with(
            settings(2, 3),
            Arc::new(FakeClient::default()),
            Arc::new(FakeClient::default()),
            2,
        );

        let mut out = Vec::new();
        let report = bench.run_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.starts_with("Fake: ")));
        assert_eq!(report.results().len(), 2);
        assert!(!report.has_failures());
    }

    #[test]
    fn report_is_written_only_after_both_backends_finish() {
        let settings = Settings {
            runs: 1,
            tests: 1,
            fail_fast: true,
        };
        let bench = benchmark_with(
            settings,
            Arc::new(FakeClient::default()),
            Arc::new(FakeClient::failing_on("delete_book")),
            1,
        );

        let mut out = Vec::new();
        let err = bench.run_to(&mut out).unwrap_err();

        assert!(matches!(err, BenchmarkError::Operation { .. }));
        assert!(out.is_empty());
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn run_to_reports_write_failure() {
        let bench = benchmark_with(
            settings(1, 1),
            Arc::new(FakeClient::default()),
            Arc::new(FakeClient::default()),
            1,
        );

        assert!(matches!(
            bench.run_to(&mut BrokenWriter),
            Err(BenchmarkError::Output(_))
        ));
    }
}
