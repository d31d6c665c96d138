use crate::events::{BetPlaced, PoolEvent, RoundSettled};
use crate::pool::{BettingPool, PoolInfo};
use crate::Result;
use chicken_core::{AccountId, Amount, Clock, Ledger};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

const EVENT_CAPACITY: usize = 256;

/// Single-writer handle around a [`BettingPool`].
///
/// The pool lock is held for the whole of every mutating call, ledger
/// transfers included, so no bet can land while a settlement is paying out.
pub struct PoolService {
    id: Uuid,
    pool: Mutex<BettingPool>,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
    event_tx: broadcast::Sender<PoolEvent>,
}

impl PoolService {
    pub fn new(pool: BettingPool, ledger: Arc<dyn Ledger>, clock: Arc<dyn Clock>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            id: pool.id(),
            pool: Mutex::new(pool),
            ledger,
            clock,
            event_tx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Receives every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.event_tx.subscribe()
    }

    pub async fn place_bet(&self, bettor: &AccountId, amount: Amount) -> Result<BetPlaced> {
        let mut pool = self.pool.lock().await;
        let event = pool
            .place_bet(self.ledger.as_ref(), self.clock.as_ref(), bettor, amount)
            .await?;
        self.publish(event.clone().into());
        Ok(event)
    }

    pub async fn settle_round(&self, settler: &AccountId) -> Result<RoundSettled> {
        let mut pool = self.pool.lock().await;
        let event = pool
            .settle_round(self.ledger.as_ref(), self.clock.as_ref(), settler)
            .await?;
        self.publish(event.clone().into());
        Ok(event)
    }

    pub async fn is_settleable(&self) -> bool {
        self.pool.lock().await.is_settleable(self.clock.as_ref())
    }

    pub async fn set_rake(&self, caller: &AccountId, new_bps: u16) -> Result<()> {
        self.pool.lock().await.set_rake(caller, new_bps)
    }

    pub async fn set_settle_reward(&self, caller: &AccountId, new_amount: Amount) -> Result<()> {
        self.pool.lock().await.set_settle_reward(caller, new_amount)
    }

    pub async fn transfer_ownership(&self, caller: &AccountId, new_owner: AccountId) -> Result<()> {
        self.pool.lock().await.transfer_ownership(caller, new_owner)
    }

    pub async fn info(&self) -> PoolInfo {
        self.pool.lock().await.get_info(self.clock.as_ref())
    }

    /// Copy of the current pool state, for persistence.
    pub async fn snapshot(&self) -> BettingPool {
        self.pool.lock().await.clone()
    }

    fn publish(&self, event: PoolEvent) {
        // no subscribers is fine
        if self.event_tx.send(event).is_err() {
            tracing::trace!("Pool {} event dropped, no subscribers", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PoolError;
    use chicken_core::{ManualClock, MemoryLedger, PoolConfig};
    use chrono::Duration as TimeDelta;
    use std::time::Duration;

    fn id(name: &str) -> AccountId {
        AccountId::new(name)
    }

    fn setup() -> (Arc<PoolService>, Arc<MemoryLedger>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let ledger = Arc::new(MemoryLedger::new());
        for n in 0..8 {
            ledger
                .credit(&id(&format!("bettor-{}", n)), Amount::from_units(100))
                .unwrap();
        }

        let config = PoolConfig::new(id("owner"), id("vault"))
            .with_bet_size(Amount::from_units(10))
            .with_interval(Duration::from_secs(30))
            .with_rake_bps(500)
            .with_settle_reward(Amount::from_units(1));
        let pool = BettingPool::new(config, clock.as_ref()).unwrap();
        let service = Arc::new(PoolService::new(pool, ledger.clone(), clock.clone()));

        (service, ledger, clock)
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let (service, _ledger, clock) = setup();
        let mut events = service.subscribe();

        service
            .place_bet(&id("bettor-0"), Amount::from_units(10))
            .await
            .unwrap();
        clock.advance(TimeDelta::seconds(1));
        service
            .place_bet(&id("bettor-1"), Amount::from_units(10))
            .await
            .unwrap();
        clock.advance(TimeDelta::seconds(30));
        assert!(service.is_settleable().await);
        service.settle_round(&id("keeper")).await.unwrap();

        let kinds: Vec<&str> = (0..3)
            .map(|_| events.try_recv().unwrap())
            .map(|e| e.kind())
            .collect();
        assert_eq!(kinds, vec!["BetPlaced", "BetPlaced", "RoundSettled"]);
    }

    #[tokio::test]
    async fn test_rejected_calls_publish_nothing() {
        let (service, _ledger, _clock) = setup();
        let mut events = service.subscribe();

        assert!(service
            .place_bet(&id("bettor-0"), Amount::from_units(9))
            .await
            .is_err());
        assert!(matches!(
            service.settle_round(&id("keeper")).await,
            Err(PoolError::RoundInProgress)
        ));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_concurrent_bets_are_serialized() {
        let (service, ledger, _clock) = setup();

        let handles: Vec<_> = (0..8)
            .map(|n| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .place_bet(&id(&format!("bettor-{}", n)), Amount::from_units(10))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let info = service.info().await;
        assert_eq!(info.bet_count, 8);
        assert_eq!(info.pool_balance, Amount::from_units(80));
        assert_eq!(
            ledger.balance_of(&info.custody).await.unwrap(),
            Amount::from_units(80)
        );
        assert!(service.snapshot().await.check_invariants().is_ok());
    }

    #[tokio::test]
    async fn test_admin_through_service() {
        let (service, _ledger, _clock) = setup();

        service.set_rake(&id("owner"), 9_999).await.unwrap();
        assert!(matches!(
            service.set_rake(&id("owner"), 10_000).await,
            Err(PoolError::RakeTooHigh { bps: 10_000 })
        ));
        service
            .set_settle_reward(&id("owner"), Amount::ZERO)
            .await
            .unwrap();

        let info = service.info().await;
        assert_eq!(info.rake_bps, 9_999);
        assert_eq!(info.settle_reward, Amount::ZERO);
    }
}
