//! SQLite-backed store shared by every component.
//!
//! One `Store` wraps one connection. Workers that run concurrently each open
//! their own `Store` against the same database file; coordination happens
//! entirely through SQLite locking.

mod retry;
mod schema;

pub use retry::RetryPolicy;

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::debug;

use crate::config::Config;
use crate::error::Result;

pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
    retry: RetryPolicy,
}

impl Store {
    /// Opens the configured database file. The schema is left alone: call
    /// [`Store::init_schema`] once per deployment (the `init` command), not
    /// from every concurrently opening worker.
    pub fn open(config: &Config) -> Result<Self> {
        Self::open_path(
            &config.database.path,
            Duration::from_millis(config.database.busy_timeout_ms),
            RetryPolicy::from(&config.retry),
        )
    }

    pub fn open_path(path: impl AsRef<Path>, busy_timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        conn.pragma_update(None, "foreign_keys", true)?;
        debug!(path = %path.display(), "opened store");
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
            retry,
        })
    }

    /// Private database with the schema already in place.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", true)?;
        let store = Self {
            conn,
            path: None,
            retry: RetryPolicy::default(),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn init_schema(&self) -> Result<()> {
        schema::init(&self.conn)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Takes the database write lock up front (`BEGIN IMMEDIATE`), so
    /// read-then-write sequences inside it are serialised across processes.
    pub fn write_transaction(&self) -> Result<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    /// Full data reset: tiles, contributors, weekly data and globals, and
    /// the country boundaries unless `keep_countries` is set.
    pub fn reset(&self, keep_countries: bool) -> Result<()> {
        self.retry.run("reset", || {
            let tx = self.write_transaction()?;
            schema::reset(&tx, keep_countries)?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn country_count(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM country_bounds")
    }

    pub fn tile_count(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM tile")
    }

    fn count(&self, sql: &str) -> Result<u64> {
        let count: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
