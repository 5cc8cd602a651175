//! Concrete storage backends implementing [`crud_core::Client`].
//!
//! Every adapter keeps exactly one connection behind a [`SharedConnection`].
//! Pool workers share the adapter, so calls against one backend are
//! serialised on that connection; the pool itself adds no locking.

pub mod postgres;
pub mod redis;
pub mod sqlite;

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use crud_core::Client;

use crate::config::RelationalEngine;

pub use self::postgres::{PostgresClient, PostgresConfig};
pub use self::redis::RedisClient;
pub use self::sqlite::SqliteClient;

/// A single connection that many threads may use one at a time, and that
/// can be closed exactly once.
pub(crate) struct SharedConnection<C> {
    inner: Mutex<Option<C>>,
}

impl<C> SharedConnection<C> {
    pub(crate) fn new(conn: C) -> Self {
        Self {
            inner: Mutex::new(Some(conn)),
        }
    }

    /// Run `f` with exclusive access to the connection.
    ///
    /// Fails if the connection has been closed or a previous holder panicked.
    pub(crate) fn with<T>(&self, f: impl FnOnce(&mut C) -> Result<T>) -> Result<T> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("connection lock poisoned"))?;
        let conn = guard.as_mut().ok_or_else(|| anyhow!("client closed"))?;
        f(conn)
    }

    /// Detach the connection so it can be closed. `None` if already closed.
    pub(crate) fn take(&self) -> Option<C> {
        match self.inner.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

/// Connect the relational side of the comparison.
pub fn open_relational(engine: &RelationalEngine) -> Result<Arc<dyn Client>> {
    match engine {
        RelationalEngine::Postgres(config) => {
            let client = PostgresClient::connect(config).context("failed to create postgres client")?;
            Ok(Arc::new(client))
        }
        RelationalEngine::Sqlite(path) => {
            let client = SqliteClient::open(path).context("failed to create sqlite client")?;
            Ok(Arc::new(client))
        }
    }
}

/// Connect the key-value side of the comparison.
pub fn open_key_value(address: &str) -> Result<Arc<dyn Client>> {
    let client = RedisClient::connect(address).context("failed to create redis client")?;
    Ok(Arc::new(client))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_connection_hands_out_mutable_access() {
        let shared = SharedConnection::new(0u32);
        shared
            .with(|n| {
                *n += 5;
                Ok(())
            })
            .unwrap();
        assert_eq!(shared.with(|n| Ok(*n)).unwrap(), 5);
    }

    #[test]
    fn taken_connection_reports_closed() {
        let shared = SharedConnection::new(String::from("conn"));
        assert_eq!(shared.take().as_deref(), Some("conn"));
        assert!(shared.take().is_none());

        let err = shared.with(|_| Ok(())).unwrap_err();
        assert!(err.to_string().contains("closed"));
    }

    #[test]
    fn sqlite_engine_opens_in_memory() {
        let client = open_relational(&RelationalEngine::Sqlite(":memory:".to_string())).unwrap();
        assert_eq!(client.name(), "SQLite");
        client.close().unwrap();
    }
}
