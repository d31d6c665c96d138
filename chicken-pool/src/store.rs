//! Pools persisted in SQLite.
//!
//! Every operation opens one write transaction, reloads the snapshot inside
//! it, runs the pool logic with the transaction as its ledger, then saves the
//! snapshot and appends the event before committing. Processes sharing the
//! database file are serialized by SQLite's write lock, and no handle ever
//! works from a snapshot it loaded earlier.

use crate::events::{BetPlaced, PoolEvent, RoundSettled};
use crate::keeper::Upkeep;
use crate::pool::{BettingPool, PoolInfo};
use crate::Result;
use async_trait::async_trait;
use chicken_core::{AccountId, Amount, Clock, PoolConfig, PoolStore, PoolTx, Storage};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

const EVENT_CAPACITY: usize = 256;

pub struct StoredPool {
    id: Uuid,
    storage: Arc<Storage>,
    clock: Arc<dyn Clock>,
    event_tx: broadcast::Sender<PoolEvent>,
}

impl StoredPool {
    /// Creates a pool and stores its first snapshot.
    pub async fn create(
        storage: Arc<Storage>,
        clock: Arc<dyn Clock>,
        config: PoolConfig,
    ) -> Result<Self> {
        let pool = BettingPool::new(config, clock.as_ref())?;
        let tx = storage.begin_pool_tx().await?;
        tx.save_pool(pool.id(), &pool)?;
        tx.commit()?;

        Ok(Self::open(storage, clock, pool.id()))
    }

    /// Handle to a stored pool. Nothing is read until the first operation.
    pub fn open(storage: Arc<Storage>, clock: Arc<dyn Clock>, id: Uuid) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            id,
            storage,
            clock,
            event_tx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Receives every event this handle commits.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.event_tx.subscribe()
    }

    /// Latest committed state.
    pub async fn load(&self) -> Result<BettingPool> {
        let pool: BettingPool = PoolStore::new(&self.storage).load_snapshot(self.id).await?;
        pool.check_invariants()?;
        Ok(pool)
    }

    pub async fn info(&self) -> Result<PoolInfo> {
        Ok(self.load().await?.get_info(self.clock.as_ref()))
    }

    pub async fn is_settleable(&self) -> Result<bool> {
        Ok(self.load().await?.is_settleable(self.clock.as_ref()))
    }

    pub async fn place_bet(&self, bettor: &AccountId, amount: Amount) -> Result<BetPlaced> {
        let tx = self.storage.begin_pool_tx().await?;
        let mut pool = self.load_in(&tx)?;

        let event = pool
            .place_bet(&tx, self.clock.as_ref(), bettor, amount)
            .await?;

        self.finish(tx, &pool, Some(event.clone().into()))?;
        Ok(event)
    }

    pub async fn settle_round(&self, settler: &AccountId) -> Result<RoundSettled> {
        let tx = self.storage.begin_pool_tx().await?;
        let mut pool = self.load_in(&tx)?;

        let event = pool
            .settle_round(&tx, self.clock.as_ref(), settler)
            .await?;

        self.finish(tx, &pool, Some(event.clone().into()))?;
        Ok(event)
    }

    pub async fn set_rake(&self, caller: &AccountId, new_bps: u16) -> Result<()> {
        let tx = self.storage.begin_pool_tx().await?;
        let mut pool = self.load_in(&tx)?;
        pool.set_rake(caller, new_bps)?;
        self.finish(tx, &pool, None)
    }

    pub async fn set_settle_reward(&self, caller: &AccountId, new_amount: Amount) -> Result<()> {
        let tx = self.storage.begin_pool_tx().await?;
        let mut pool = self.load_in(&tx)?;
        pool.set_settle_reward(caller, new_amount)?;
        self.finish(tx, &pool, None)
    }

    pub async fn transfer_ownership(&self, caller: &AccountId, new_owner: AccountId) -> Result<()> {
        let tx = self.storage.begin_pool_tx().await?;
        let mut pool = self.load_in(&tx)?;
        pool.transfer_ownership(caller, new_owner)?;
        self.finish(tx, &pool, None)
    }

    fn load_in(&self, tx: &PoolTx<'_>) -> Result<BettingPool> {
        let pool: BettingPool = tx.load_pool(self.id)?;
        pool.check_invariants()?;
        Ok(pool)
    }

    fn finish(&self, tx: PoolTx<'_>, pool: &BettingPool, event: Option<PoolEvent>) -> Result<()> {
        tx.save_pool(self.id, pool)?;
        if let Some(event) = &event {
            tx.append_event(self.id, event.kind(), event)?;
        }
        tx.commit()?;

        if let Some(event) = event {
            if self.event_tx.send(event).is_err() {
                tracing::trace!("Pool {} event dropped, no subscribers", self.id);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Upkeep for StoredPool {
    fn pool_id(&self) -> Uuid {
        self.id
    }

    async fn check_upkeep(&self) -> Result<bool> {
        self.is_settleable().await
    }

    async fn perform_upkeep(&self, settler: &AccountId) -> Result<RoundSettled> {
        self.settle_round(settler).await
    }
}
