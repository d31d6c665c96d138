//! Last-bettor-wins escrow pool
//!
//! Bettors pay a fixed `bet_size` into a shared pool. Once two or more bets
//! have been placed and `interval` passes without another one, anyone can
//! settle the round: the last bettor takes the pool minus the vault's rake and
//! the settler's reward.

pub mod error;
pub mod events;
pub mod keeper;
pub mod payout;
pub mod pool;
pub mod service;
pub mod store;

pub use error::{PoolError, Result};
pub use events::{BetPlaced, PoolEvent, RoundSettled};
pub use keeper::{run_keeper, KeeperConfig, Upkeep};
pub use payout::{compute_payout, Payout};
pub use pool::{BettingPool, PoolInfo, RoundPhase};
pub use service::PoolService;
pub use store::StoredPool;

use chicken_core::{Clock, Ledger, PoolConfig};
use std::sync::Arc;

/// Create a pool and wrap it in a serializing service.
pub fn open_pool(
    config: PoolConfig,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
) -> Result<PoolService> {
    let pool = BettingPool::new(config, clock.as_ref())?;
    Ok(PoolService::new(pool, ledger, clock))
}

/// Wrap a restored pool snapshot, rejecting inconsistent state.
pub fn resume_pool(
    pool: BettingPool,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
) -> Result<PoolService> {
    pool.check_invariants()?;
    Ok(PoolService::new(pool, ledger, clock))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chicken_core::{AccountId, Amount, ManualClock, PoolStore, SqliteLedger, Storage};
    use chrono::Duration as TimeDelta;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_pool_survives_restart() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("chicken.db");
        let clock = Arc::new(ManualClock::default());
        let alice = AccountId::new("alice");
        let bob = AccountId::new("bob");

        let pool_id = {
            let storage = Arc::new(Storage::new(&db_path).await.unwrap());
            let ledger = Arc::new(SqliteLedger::new(storage.clone()));
            ledger.credit(&alice, Amount::from_units(100)).await.unwrap();
            ledger.credit(&bob, Amount::from_units(100)).await.unwrap();

            let config = PoolConfig::new(AccountId::new("owner"), AccountId::new("vault"))
                .with_bet_size(Amount::from_units(10))
                .with_settle_reward(Amount::from_units(1));
            let service = open_pool(config, ledger, clock.clone()).unwrap();
            service.place_bet(&alice, Amount::from_units(10)).await.unwrap();
            service.place_bet(&bob, Amount::from_units(10)).await.unwrap();

            PoolStore::new(&storage)
                .save_snapshot(service.id(), &service.snapshot().await)
                .await
                .unwrap();
            service.id()
        };

        let storage = Arc::new(Storage::new(&db_path).await.unwrap());
        let ledger = Arc::new(SqliteLedger::new(storage.clone()));
        let pool: BettingPool = PoolStore::new(&storage)
            .load_snapshot(pool_id)
            .await
            .unwrap();
        let service = resume_pool(pool, ledger.clone(), clock.clone()).unwrap();

        clock.advance(TimeDelta::seconds(31));
        let settled = service.settle_round(&alice).await.unwrap();

        assert_eq!(settled.winner, bob);
        assert_eq!(settled.amount, Amount::from_units(18));
        assert_eq!(ledger.balance_of(&bob).await.unwrap(), Amount::from_units(108));
        assert_eq!(ledger.balance_of(&alice).await.unwrap(), Amount::from_units(91));
    }
}
