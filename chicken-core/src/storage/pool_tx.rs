use super::event_store::insert_event;
use super::ledger_store::{apply_transfers, read_balance};
use super::pool_store::{read_snapshot, write_snapshot};
use crate::error::Result;
use crate::ledger::{Ledger, Transfer};
use crate::types::{AccountId, Amount};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

/// One pool operation as a single SQLite write transaction.
///
/// The snapshot load, the ledger legs, the snapshot save and the event
/// append all see and produce one consistent state. Nothing is visible to
/// other connections until [`PoolTx::commit`]; dropping the handle rolls
/// everything back.
pub struct PoolTx<'a> {
    conn: Mutex<tokio::sync::MutexGuard<'a, Connection>>,
    finished: bool,
}

impl<'a> PoolTx<'a> {
    pub(crate) fn begin(conn: tokio::sync::MutexGuard<'a, Connection>) -> Result<Self> {
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Self {
            conn: Mutex::new(conn),
            finished: false,
        })
    }

    pub fn load_pool<T: DeserializeOwned>(&self, id: Uuid) -> Result<T> {
        read_snapshot(&self.conn.lock(), id)
    }

    pub fn save_pool<T: Serialize>(&self, id: Uuid, snapshot: &T) -> Result<()> {
        write_snapshot(&self.conn.lock(), id, snapshot)
    }

    /// The pool row must already exist in this transaction.
    pub fn append_event<T: Serialize>(&self, pool_id: Uuid, kind: &str, payload: &T) -> Result<u64> {
        insert_event(&self.conn.lock(), pool_id, kind, payload)
    }

    pub fn commit(mut self) -> Result<()> {
        self.conn.get_mut().execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for PoolTx<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.conn.get_mut().execute_batch("ROLLBACK") {
            tracing::warn!("Failed to roll back pool transaction: {}", e);
        }
    }
}

#[async_trait]
impl<'a> Ledger for PoolTx<'a> {
    async fn balance_of(&self, account: &AccountId) -> Result<Amount> {
        read_balance(&self.conn.lock(), account)
    }

    async fn transfer(&self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<()> {
        self.transfer_batch(&[Transfer::new(from.clone(), to.clone(), amount)])
            .await
    }

    /// Runs under a savepoint so a failed batch leaves the rest of the
    /// transaction usable.
    async fn transfer_batch(&self, transfers: &[Transfer]) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch("SAVEPOINT legs")?;

        match apply_transfers(&conn, transfers) {
            Ok(()) => {
                conn.execute_batch("RELEASE legs")?;
                Ok(())
            }
            Err(e) => {
                conn.execute_batch("ROLLBACK TO legs; RELEASE legs")?;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::storage::{PoolStore, SqliteLedger, Storage};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn id(name: &str) -> AccountId {
        AccountId::new(name)
    }

    #[tokio::test]
    async fn test_commit_publishes_everything() {
        let temp_dir = tempdir().unwrap();
        let storage = Arc::new(Storage::new(&temp_dir.path().join("tx.db")).await.unwrap());
        let ledger = SqliteLedger::new(storage.clone());
        ledger.credit(&id("alice"), Amount::from_units(10)).await.unwrap();
        let pool_id = Uuid::new_v4();

        let tx = storage.begin_pool_tx().await.unwrap();
        tx.save_pool(pool_id, &vec![1u64]).unwrap();
        tx.transfer(&id("alice"), &id("custody"), Amount::from_units(10))
            .await
            .unwrap();
        assert_eq!(tx.append_event(pool_id, "BetPlaced", &1u64).unwrap(), 1);
        let loaded: Vec<u64> = tx.load_pool(pool_id).unwrap();
        assert_eq!(loaded, vec![1]);
        tx.commit().unwrap();

        assert_eq!(
            ledger.balance_of(&id("custody")).await.unwrap(),
            Amount::from_units(10)
        );
        let stored: Vec<u64> = PoolStore::new(&storage).load_snapshot(pool_id).await.unwrap();
        assert_eq!(stored, vec![1]);
    }

    #[tokio::test]
    async fn test_drop_rolls_back() {
        let temp_dir = tempdir().unwrap();
        let storage = Arc::new(Storage::new(&temp_dir.path().join("tx.db")).await.unwrap());
        let ledger = SqliteLedger::new(storage.clone());
        ledger.credit(&id("alice"), Amount::from_units(10)).await.unwrap();
        let pool_id = Uuid::new_v4();

        {
            let tx = storage.begin_pool_tx().await.unwrap();
            tx.save_pool(pool_id, &vec![1u64]).unwrap();
            tx.transfer(&id("alice"), &id("custody"), Amount::from_units(10))
                .await
                .unwrap();
        }

        assert_eq!(
            ledger.balance_of(&id("alice")).await.unwrap(),
            Amount::from_units(10)
        );
        assert!(!PoolStore::new(&storage).pool_exists(pool_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_batch_keeps_transaction_usable() {
        let temp_dir = tempdir().unwrap();
        let storage = Arc::new(Storage::new(&temp_dir.path().join("tx.db")).await.unwrap());
        let ledger = SqliteLedger::new(storage.clone());
        ledger.credit(&id("pool"), Amount::from_units(20)).await.unwrap();

        let tx = storage.begin_pool_tx().await.unwrap();
        let batch = vec![
            Transfer::new(id("pool"), id("winner"), Amount::from_units(18)),
            Transfer::new(id("pool"), id("vault"), Amount::from_units(3)),
        ];
        let err = tx.transfer_batch(&batch).await.unwrap_err();
        assert!(matches!(err, CoreError::InsufficientFunds { .. }));
        assert_eq!(tx.balance_of(&id("winner")).await.unwrap(), Amount::ZERO);

        tx.transfer(&id("pool"), &id("vault"), Amount::from_units(3))
            .await
            .unwrap();
        tx.commit().unwrap();

        assert_eq!(
            ledger.balance_of(&id("pool")).await.unwrap(),
            Amount::from_units(17)
        );
    }
}
