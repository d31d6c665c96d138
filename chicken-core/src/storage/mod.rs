pub mod event_store;
pub mod ledger_store;
pub mod pool_store;
pub mod pool_tx;

pub use event_store::{EventRecord, EventStore};
pub use ledger_store::SqliteLedger;
pub use pool_store::{PoolRecord, PoolStore};
pub use pool_tx::PoolTx;

use crate::error::{CoreError, Result};
use crate::types::Amount;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;

// how long a writer waits for another process holding the database
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    pub async fn new(db_path: &Path) -> Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::internal(format!("Failed to create directory: {}", e)))?;
        }

        let conn = Connection::open(db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let storage = Self {
            conn: Mutex::new(conn),
        };

        storage.init_schema().await?;
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().await;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                balance INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        // Pool snapshots, one row per pool
        conn.execute(
            "CREATE TABLE IF NOT EXISTS pools (
                id TEXT PRIMARY KEY,
                snapshot TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS events (
                pool_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (pool_id) REFERENCES pools(id),
                PRIMARY KEY (pool_id, seq)
            )",
            [],
        )?;

        Ok(())
    }

    pub async fn get_connection(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }

    /// Opens a write transaction (`BEGIN IMMEDIATE`) that excludes every
    /// other writer on the database file, other processes included, until
    /// the returned handle is committed or dropped.
    pub async fn begin_pool_tx(&self) -> Result<PoolTx<'_>> {
        PoolTx::begin(self.get_connection().await)
    }
}

// SQLite integers are signed
pub(crate) fn amount_to_sql(amount: Amount) -> Result<i64> {
    i64::try_from(amount.to_units())
        .map_err(|_| CoreError::overflow(format!("{} does not fit in storage", amount)))
}

pub(crate) fn amount_from_sql(value: i64) -> Result<Amount> {
    u64::try_from(value)
        .map(Amount::from_units)
        .map_err(|_| CoreError::internal(format!("Negative balance in storage: {}", value)))
}
