//! CRUD latency benchmark: a relational store vs a key-value store.
//!
//! A fixed CRUD cycle (create author and book, update both, read both,
//! delete both) is fanned out over a bounded worker pool. Each run submits
//! `tests` independent cycles, drains the pool and records the wall-clock
//! time; the report shows the mean per backend.
//!
//! Run benchmarks: `cargo run --release`
//! Run tests: `cargo test`

/// Bounded worker pool with rendezvous handoff and a completion barrier.
pub mod workerpool;

/// Measurement protocol and the per-task CRUD cycle.
pub mod benchmark;

/// Per-backend measurements and the text report.
pub mod report;

/// Environment-based configuration.
pub mod config;

/// PostgreSQL, Redis and SQLite implementations of [`crud_core::Client`].
pub mod clients;
