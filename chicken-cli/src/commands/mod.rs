pub mod account;
pub mod pool;
pub mod round;

pub use account::{fund, show_balance};
pub use pool::{
    init_pool, list_pools, set_rake, set_reward, show_history, show_status, transfer_owner,
    InitArgs,
};
pub use round::{place_bet, settle, watch};

use crate::config::CliConfig;
use anyhow::{bail, Context as _, Result};
use chicken_core::{CoreError, EventStore, PoolConfig, PoolStore, SqliteLedger, Storage, SystemClock};
use chicken_pool::StoredPool;
use std::sync::Arc;
use uuid::Uuid;

/// Everything a command needs: the database, the ledger living in it, and
/// the clock.
pub struct Context {
    storage: Arc<Storage>,
    ledger: Arc<SqliteLedger>,
    clock: Arc<SystemClock>,
}

impl Context {
    pub async fn open(config: &CliConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir)
            .await
            .with_context(|| format!("Failed to create {}", config.data_dir.display()))?;

        let storage = Arc::new(Storage::new(&config.db_path()).await?);
        let ledger = Arc::new(SqliteLedger::new(storage.clone()));

        Ok(Self {
            storage,
            ledger,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn ledger(&self) -> &SqliteLedger {
        &self.ledger
    }

    pub fn pools(&self) -> PoolStore<'_> {
        PoolStore::new(&self.storage)
    }

    pub fn events(&self) -> EventStore<'_> {
        EventStore::new(&self.storage)
    }

    pub async fn create_pool(&self, config: PoolConfig) -> Result<StoredPool> {
        Ok(StoredPool::create(self.storage.clone(), self.clock.clone(), config).await?)
    }

    /// Accepts a full pool id or a prefix matching exactly one pool.
    pub async fn resolve_pool(&self, id_or_prefix: &str) -> Result<Uuid> {
        if let Ok(id) = Uuid::parse_str(id_or_prefix) {
            return Ok(id);
        }

        let matches: Vec<Uuid> = self
            .pools()
            .list_pools()
            .await?
            .into_iter()
            .map(|record| record.id)
            .filter(|id| id.to_string().starts_with(id_or_prefix))
            .collect();

        match matches.as_slice() {
            [id] => Ok(*id),
            [] => Err(CoreError::PoolNotFound {
                id: id_or_prefix.to_string(),
            }
            .into()),
            _ => bail!("Pool prefix '{}' is ambiguous", id_or_prefix),
        }
    }

    /// Handle to a stored pool. Each operation on it reloads the pool
    /// inside its own write transaction.
    pub async fn pool(&self, id_or_prefix: &str) -> Result<StoredPool> {
        let id = self.resolve_pool(id_or_prefix).await?;
        Ok(StoredPool::open(
            self.storage.clone(),
            self.clock.clone(),
            id,
        ))
    }
}

pub(crate) fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
