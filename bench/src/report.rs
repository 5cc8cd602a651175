//! Report module: per-backend measurements and the textual comparison.

use std::fmt;
use std::time::Duration;

/// Timing and task outcomes collected for one backend.
#[derive(Debug, Clone, Default)]
pub struct Measurement {
    /// Wall-clock time of each run (submit all tasks, then drain the pool).
    pub samples: Vec<Duration>,
    /// Arithmetic mean of `samples`, truncated to whole nanoseconds.
    pub average: Duration,
    /// Tasks submitted across all runs.
    pub submitted: usize,
    /// Tasks whose CRUD cycle failed or that never reported an outcome.
    pub failed: usize,
}

impl Measurement {
    pub fn new(samples: Vec<Duration>, submitted: usize, failed: usize) -> Self {
        let average = mean(&samples);
        Self {
            samples,
            average,
            submitted,
            failed,
        }
    }

    pub fn total(&self) -> Duration {
        self.samples.iter().sum()
    }
}

/// Integer mean of `samples`; zero for an empty slice.
pub fn mean(samples: &[Duration]) -> Duration {
    if samples.is_empty() {
        return Duration::ZERO;
    }
    let total: Duration = samples.iter().sum();
    let nanos = total.as_nanos() / samples.len() as u128;
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

#[derive(Debug, Clone)]
pub struct BackendResult {
    pub name: &'static str,
    pub measurement: Measurement,
}

/// Results for every benchmarked backend, in measurement order.
#[derive(Debug, Clone, Default)]
pub struct Report {
    results: Vec<BackendResult>,
}

impl Report {
    pub fn push(&mut self, name: &'static str, measurement: Measurement) {
        self.results.push(BackendResult { name, measurement });
    }

    pub fn results(&self) -> &[BackendResult] {
        &self.results
    }

    pub fn total_failures(&self) -> usize {
        self.results.iter().map(|r| r.measurement.failed).sum()
    }

    pub fn has_failures(&self) -> bool {
        self.total_failures() > 0
    }
}

/// One line per backend: `Postgres: 1.234567s`, with a failure note when
/// any task of that backend failed.
impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for result in &self.results {
            let m = &result.measurement;
            write!(f, "{}: {:?}", result.name, m.average)?;
            if m.failed > 0 {
                write!(f, " ({} of {} tasks failed)", m.failed, m.submitted)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
