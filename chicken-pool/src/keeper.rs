//! Upkeep automation: settles a pool as soon as it becomes settleable.

use crate::events::RoundSettled;
use crate::service::PoolService;
use crate::{PoolError, Result};
use async_trait::async_trait;
use chicken_core::AccountId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

/// What a keeper drives. `PoolService` implements it directly; hosts that
/// keep the pool elsewhere (a database, another process) implement it by
/// loading and saving around each call.
#[async_trait]
pub trait Upkeep: Send + Sync {
    fn pool_id(&self) -> Uuid;

    async fn check_upkeep(&self) -> Result<bool>;

    async fn perform_upkeep(&self, settler: &AccountId) -> Result<RoundSettled>;
}

#[async_trait]
impl Upkeep for PoolService {
    fn pool_id(&self) -> Uuid {
        self.id()
    }

    async fn check_upkeep(&self) -> Result<bool> {
        Ok(self.is_settleable().await)
    }

    async fn perform_upkeep(&self, settler: &AccountId) -> Result<RoundSettled> {
        self.settle_round(settler).await
    }
}

#[derive(Debug, Clone)]
pub struct KeeperConfig {
    /// Receives the settle reward.
    pub settler: AccountId,
    pub poll_every: Duration,
}

impl KeeperConfig {
    pub fn new(settler: AccountId) -> Self {
        Self {
            settler,
            poll_every: Duration::from_secs(1),
        }
    }

    pub fn with_poll_every(mut self, poll_every: Duration) -> Self {
        self.poll_every = poll_every;
        self
    }
}

/// Polls `upkeep` until `shutdown` flips to `true` or its sender is dropped.
/// Failures are logged and retried on the next tick. Returns the number of
/// rounds this keeper settled.
pub async fn run_keeper<U: Upkeep + ?Sized>(
    upkeep: Arc<U>,
    config: KeeperConfig,
    mut shutdown: watch::Receiver<bool>,
) -> u64 {
    let mut ticker = tokio::time::interval(config.poll_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let pool_id = upkeep.pool_id();
    let mut settled = 0u64;

    tracing::info!("Keeper for pool {} started, settler {}", pool_id, config.settler);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match upkeep.check_upkeep().await {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(e) => {
                        tracing::warn!("Keeper check for pool {} failed: {}", pool_id, e);
                        continue;
                    }
                }

                match upkeep.perform_upkeep(&config.settler).await {
                    Ok(event) => {
                        settled += 1;
                        tracing::info!(
                            "Keeper settled round {} of pool {}: {} wins {}",
                            event.round,
                            pool_id,
                            event.winner,
                            event.amount
                        );
                    }
                    // someone else settled between the check and the call
                    Err(PoolError::RoundInProgress) => {}
                    Err(e) => {
                        tracing::warn!("Keeper failed to settle pool {}: {}", pool_id, e);
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!("Keeper for pool {} stopped after {} settlement(s)", pool_id, settled);
    settled
}
