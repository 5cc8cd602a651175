//! Bounded worker pool with an explicit start / drain / stop lifecycle.
//!
//! Tasks reach workers through a zero-capacity channel: [`Pool::add`] only
//! returns once a worker has taken the task, or once the pool is stopped.
//! There is no queue beyond that single rendezvous, so a slow backend pushes
//! back on the submitter instead of growing memory.
//!
//! # Lifecycle
//!
//! | State     | `add`                          | `run`            | `wait`                 |
//! |-----------|--------------------------------|------------------|------------------------|
//! | `Created` | blocks until workers start     | starts workers   | returns when drained   |
//! | `Running` | blocks until a worker is free  | `AlreadyStarted` | returns when drained   |
//! | `Stopped` | `Stopped`                      | `Stopped`        | `Stopped` immediately  |
//!
//! # Completion accounting
//!
//! A task is counted as in flight from the moment `add` begins the handoff
//! until its body has returned on a worker. [`Pool::wait`] blocks on a
//! condition variable until that count reaches zero, so it is a real barrier
//! for every task submitted before it, including tasks a worker is still
//! executing. If the pool is stopped first, `wait` gives up on the barrier
//! and reports [`PoolError::Stopped`], since the tasks it was waiting for
//! may still be running.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use thiserror::Error;

/// A unit of work. The pool does not track task identity.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool has been stopped; it never accepts work again.
    #[error("worker pool is stopped")]
    Stopped,
    #[error("worker pool is already running")]
    AlreadyStarted,
    #[error("failed to spawn pool worker: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Created,
    Running,
    Stopped,
}

/// Task scheduler contract used by the benchmark driver.
pub trait Pool: Send + Sync {
    /// Hand `task` to a worker, blocking until one accepts it.
    fn add(&self, task: Task) -> Result<(), PoolError>;
    /// Start the workers. Valid once.
    fn run(&self) -> Result<(), PoolError>;
    /// Block until every task submitted so far has finished.
    ///
    /// Fails with [`PoolError::Stopped`] when the pool is stopped before (or
    /// while) draining; the submitted tasks are then not known to be done.
    fn wait(&self) -> Result<(), PoolError>;
    /// Refuse further work and let workers exit after their current task.
    fn stop(&self);
}

struct Accounting {
    state: PoolState,
    in_flight: usize,
}

struct Shared {
    accounting: Mutex<Accounting>,
    drained: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Accounting> {
        // Only plain counters live behind this lock, so a poisoned guard is still usable.
        self.accounting
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn finish_one(&self) {
        let mut acc = self.lock();
        acc.in_flight = acc.in_flight.saturating_sub(1);
        if acc.in_flight == 0 {
            self.drained.notify_all();
        }
    }
}

pub struct WorkerPool {
    worker_count: usize,
    task_tx: Sender<Task>,
    task_rx: Receiver<Task>,
    /// Dropped (disconnected) by `stop`; workers and blocked `add` calls
    /// observe the disconnect through `select!`.
    stop_tx: Mutex<Option<Sender<()>>>,
    stop_rx: Receiver<()>,
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Create a pool of `worker_count` workers. Nothing runs until [`Pool::run`].
    pub fn new(worker_count: usize) -> Self {
        let (task_tx, task_rx) = bounded::<Task>(0);
        let (stop_tx, stop_rx) = bounded::<()>(0);

        Self {
            worker_count,
            task_tx,
            task_rx,
            stop_tx: Mutex::new(Some(stop_tx)),
            stop_rx,
            shared: Arc::new(Shared {
                accounting: Mutex::new(Accounting {
                    state: PoolState::Created,
                    in_flight: 0,
                }),
                drained: Condvar::new(),
            }),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn state(&self) -> PoolState {
        self.shared.lock().state
    }

    /// Tasks submitted but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.shared.lock().in_flight
    }

    /// Stop the pool and join every worker thread.
    ///
    /// Blocks until each worker has finished the task it is running, if any.
    /// Safe to call multiple times. Also called by the [`Drop`] implementation.
    pub fn shutdown(&self) {
        self.stop();

        let handles: Vec<JoinHandle<()>> = match self.handles.lock() {
            Ok(mut guard) => guard.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        for handle in handles {
            if let Err(e) = handle.join() {
                log::error!("Pool worker thread panicked: {e:?}");
            }
        }
    }
}

impl Pool for WorkerPool {
    fn add(&self, task: Task) -> Result<(), PoolError> {
        {
            let mut acc = self.shared.lock();
            if acc.state == PoolState::Stopped {
                return Err(PoolError::Stopped);
            }
            acc.in_flight += 1;
        }

        select! {
            send(self.task_tx, task) -> res => match res {
                Ok(()) => Ok(()),
                Err(_) => {
                    self.shared.finish_one();
                    Err(PoolError::Stopped)
                }
            },
            recv(self.stop_rx) -> _ => {
                self.shared.finish_one();
                Err(PoolError::Stopped)
            }
        }
    }

    fn run(&self) -> Result<(), PoolError> {
        {
            let mut acc = self.shared.lock();
            match acc.state {
                PoolState::Created => acc.state = PoolState::Running,
                PoolState::Running => return Err(PoolError::AlreadyStarted),
                PoolState::Stopped => return Err(PoolError::Stopped),
            }
        }

        let mut handles = self
            .handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        for id in 0..self.worker_count {
            let tasks = self.task_rx.clone();
            let stop = self.stop_rx.clone();
            let shared = Arc::clone(&self.shared);

            let handle = thread::Builder::new()
                .name(format!("pool-worker-{id}"))
                .spawn(move || worker_main(id, tasks, stop, shared))?;
            handles.push(handle);
        }

        log::info!("Worker pool started with {} workers.", self.worker_count);
        Ok(())
    }

    fn wait(&self) -> Result<(), PoolError> {
        let acc = self.shared.lock();
        let acc = self
            .shared
            .drained
            .wait_while(acc, |acc| {
                acc.in_flight > 0 && acc.state != PoolState::Stopped
            })
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match acc.state {
            PoolState::Stopped => Err(PoolError::Stopped),
            _ => Ok(()),
        }
    }

    fn stop(&self) {
        {
            let mut acc = self.shared.lock();
            if acc.state == PoolState::Stopped {
                return;
            }
            acc.state = PoolState::Stopped;
        }

        // Disconnecting wakes idle workers and any `add` blocked on the handoff.
        let stop_tx = match self.stop_tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(stop_tx);

        self.shared.drained.notify_all();
        log::info!("Worker pool stopped.");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Worker loop: take tasks until the stop channel disconnects.
///
/// A task that panics is logged and counted as finished; the worker keeps
/// serving.
fn worker_main(id: usize, tasks: Receiver<Task>, stop: Receiver<()>, shared: Arc<Shared>) {
    log::debug!("Pool worker {id} started.");

    loop {
        select! {
            recv(stop) -> _ => break,
            recv(tasks) -> msg => match msg {
                Ok(task) => {
                    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                        log::error!("Pool worker {id}: task panicked");
                    }
                    shared.finish_one();
                }
                Err(_) => break,
            },
        }
    }

    log::debug!("Pool worker {id} exiting.");
}

// ---------------------------------------------------------------------------
//  Unit Tests
// ---------------------------------------------------------------------------
