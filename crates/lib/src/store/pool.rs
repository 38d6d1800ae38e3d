//! Bounded pool of SQLite connections to one database file.
//!
//! Checkout is gated by a semaphore sized to `max_connections`; returned connections stay open
//! while fewer than `max_idle` are idle. All SQLite work runs on the blocking thread pool.

use crate::config::DatabaseConfig;
use crate::store::StoreError;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Pool bounds and per-connection settings.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub min_idle: usize,
    pub max_idle: usize,
    pub max_connections: usize,
    pub busy_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        PoolOptions::from(&DatabaseConfig::default())
    }
}

impl From<&DatabaseConfig> for PoolOptions {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            min_idle: config.min_idle,
            max_idle: config.max_idle,
            max_connections: config.max_connections.max(1),
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
        }
    }
}

struct PoolInner {
    path: PathBuf,
    options: PoolOptions,
    idle: Mutex<Vec<Connection>>,
    permits: Arc<Semaphore>,
}

impl PoolInner {
    fn checkout(&self) -> Result<Connection, StoreError> {
        let pooled = self
            .idle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop();
        match pooled {
            Some(conn) => Ok(conn),
            None => open_connection(&self.path, &self.options),
        }
    }

    fn checkin(&self, conn: Connection) {
        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        if idle.len() < self.options.max_idle {
            idle.push(conn);
        }
    }
}

fn open_connection(path: &Path, options: &PoolOptions) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(options.busy_timeout)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(conn)
}

/// Shared handle to the pool; clones refer to the same connections.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Open the database (creating parent directories), run `init_sql` once, and pre-open
    /// `min_idle` connections.
    pub fn open(
        path: impl AsRef<Path>,
        options: PoolOptions,
        init_sql: &str,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let first = open_connection(&path, &options)?;
        first.execute_batch(init_sql)?;
        let mut idle = vec![first];
        while idle.len() < options.min_idle {
            idle.push(open_connection(&path, &options)?);
        }
        idle.truncate(options.max_idle);
        log::info!(
            "store: opened {} ({} idle, max {} connections)",
            path.display(),
            idle.len(),
            options.max_connections
        );
        let permits = Arc::new(Semaphore::new(options.max_connections.max(1)));
        Ok(Self {
            inner: Arc::new(PoolInner {
                path,
                options,
                idle: Mutex::new(idle),
                permits,
            }),
        })
    }

    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Check out a connection, run `f` on the blocking pool, and return the connection.
    pub async fn run<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| StoreError::PoolClosed)?;
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let mut conn = inner.checkout()?;
            let result = f(&mut conn);
            inner.checkin(conn);
            result
        })
        .await?
    }
}
