use crate::events::{BetPlaced, RoundSettled};
use crate::payout::compute_payout;
use crate::{PoolError, Result};
use chicken_core::{AccountId, Amount, Clock, Ledger, PoolConfig, BPS_DENOMINATOR};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Where the current round stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundPhase {
    /// No bets since the last settlement.
    Empty,
    /// Accepting bets.
    Open { bets: u32 },
    /// Two or more bets and a full interval without a new one. Closed to
    /// bets until settled.
    Settleable { bets: u32 },
}

/// Last-bettor-wins escrow pool.
///
/// Every mutating operation validates all of its preconditions before it
/// touches the ledger, and touches local state only after the ledger call
/// succeeded. A failed call leaves the pool exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BettingPool {
    id: Uuid,
    config: PoolConfig,
    custody: AccountId,
    round: u64,
    pool_balance: Amount,
    bet_count: u32,
    last_bettor: Option<AccountId>,
    last_bet_timestamp: DateTime<Utc>,
    recent_winner: Option<AccountId>,
    recent_win_amount: Amount,
    created_at: DateTime<Utc>,
}

impl BettingPool {
    pub fn new(config: PoolConfig, clock: &dyn Clock) -> Result<Self> {
        if config.rake_bps >= BPS_DENOMINATOR {
            return Err(PoolError::RakeTooHigh {
                bps: config.rake_bps,
            });
        }
        config
            .validate()
            .map_err(|e| PoolError::InvalidConfig(e.to_string()))?;

        let id = Uuid::new_v4();
        let now = clock.now();

        tracing::info!(
            "Created pool {} (bet size {}, interval {}s, rake {} bps, settle reward {})",
            id,
            config.bet_size,
            config.interval.as_secs(),
            config.rake_bps,
            config.settle_reward
        );

        Ok(Self {
            id,
            custody: custody_account(id),
            config,
            round: 1,
            pool_balance: Amount::ZERO,
            bet_count: 0,
            last_bettor: None,
            last_bet_timestamp: now,
            recent_winner: None,
            recent_win_amount: Amount::ZERO,
            created_at: now,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn bet_size(&self) -> Amount {
        self.config.bet_size
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    pub fn rake_bps(&self) -> u16 {
        self.config.rake_bps
    }

    pub fn settle_reward(&self) -> Amount {
        self.config.settle_reward
    }

    pub fn vault(&self) -> &AccountId {
        &self.config.vault
    }

    pub fn owner(&self) -> &AccountId {
        &self.config.owner
    }

    /// Ledger account holding the escrowed bets.
    pub fn custody(&self) -> &AccountId {
        &self.custody
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn pool_balance(&self) -> Amount {
        self.pool_balance
    }

    pub fn bet_count(&self) -> u32 {
        self.bet_count
    }

    pub fn last_bettor(&self) -> Option<&AccountId> {
        self.last_bettor.as_ref()
    }

    pub fn last_bet_timestamp(&self) -> DateTime<Utc> {
        self.last_bet_timestamp
    }

    pub fn recent_winner(&self) -> Option<&AccountId> {
        self.recent_winner.as_ref()
    }

    pub fn recent_win_amount(&self) -> Amount {
        self.recent_win_amount
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Settlement predicate: at least two bets this round and `interval`
    /// elapsed since the last one. Pure, callable any number of times.
    pub fn is_settleable(&self, clock: &dyn Clock) -> bool {
        self.settleable_at(clock.now())
    }

    fn settleable_at(&self, now: DateTime<Utc>) -> bool {
        // only exact bet_size contributions exist, so this counts bets
        let two_bets = self
            .config
            .bet_size
            .checked_mul(2)
            .map_or(false, |min| self.pool_balance >= min);
        if !two_bets {
            return false;
        }

        // a clock behind the last bet reads as "not elapsed"
        match (now - self.last_bet_timestamp).to_std() {
            Ok(elapsed) => elapsed >= self.config.interval,
            Err(_) => false,
        }
    }

    pub fn phase(&self, clock: &dyn Clock) -> RoundPhase {
        if self.bet_count == 0 {
            RoundPhase::Empty
        } else if self.is_settleable(clock) {
            RoundPhase::Settleable {
                bets: self.bet_count,
            }
        } else {
            RoundPhase::Open {
                bets: self.bet_count,
            }
        }
    }

    pub fn can_place_bet(&self, clock: &dyn Clock) -> bool {
        !self.is_settleable(clock)
    }

    /// Time left before the round becomes settleable, if it has the two bets
    /// it needs.
    pub fn time_until_settleable(&self, clock: &dyn Clock) -> Option<Duration> {
        if self.bet_count < 2 {
            return None;
        }
        let elapsed = (clock.now() - self.last_bet_timestamp)
            .to_std()
            .unwrap_or(Duration::ZERO);
        Some(self.config.interval.saturating_sub(elapsed))
    }

    /// Accept one bet of exactly `bet_size` from `bettor`.
    pub async fn place_bet(
        &mut self,
        ledger: &dyn Ledger,
        clock: &dyn Clock,
        bettor: &AccountId,
        amount: Amount,
    ) -> Result<BetPlaced> {
        if amount != self.config.bet_size {
            return Err(PoolError::WrongBetAmount {
                expected: self.config.bet_size.to_units(),
                got: amount.to_units(),
            });
        }

        if bettor == &self.custody {
            return Err(PoolError::Unauthorized {
                caller: bettor.to_string(),
            });
        }

        let now = clock.now();
        if self.settleable_at(now) {
            tracing::debug!("Pool {} rejected bet from {}: round closed", self.id, bettor);
            return Err(PoolError::RoundClosed);
        }

        let pool_balance = self.pool_balance.try_add(amount)?;
        let bet_count = self
            .bet_count
            .checked_add(1)
            .ok_or_else(|| PoolError::Internal("bet counter overflow".to_string()))?;

        ledger
            .transfer(bettor, &self.custody, amount)
            .await
            .map_err(PoolError::from_ledger)?;

        // the clock may stand still or step back between bets, the stamp
        // still has to move forward
        let stamp = if now > self.last_bet_timestamp {
            now
        } else {
            self.last_bet_timestamp + TimeDelta::nanoseconds(1)
        };

        self.pool_balance = pool_balance;
        self.bet_count = bet_count;
        self.last_bettor = Some(bettor.clone());
        self.last_bet_timestamp = stamp;

        tracing::info!(
            "Pool {} round {}: {} bet {} (pool now {}, {} bets)",
            self.id,
            self.round,
            bettor,
            amount,
            pool_balance,
            bet_count
        );

        Ok(BetPlaced {
            pool_id: self.id,
            round: self.round,
            bettor: bettor.clone(),
            amount,
            timestamp: stamp,
            pool_balance,
        })
    }

    /// Pay out a settleable round: winnings to the last bettor, rake to the
    /// vault, settle reward to `settler`. The three legs go to the ledger as
    /// one batch.
    pub async fn settle_round(
        &mut self,
        ledger: &dyn Ledger,
        clock: &dyn Clock,
        settler: &AccountId,
    ) -> Result<RoundSettled> {
        let now = clock.now();
        if !self.settleable_at(now) {
            tracing::warn!(
                "Pool {} settlement by {} rejected: round {} in progress",
                self.id,
                settler,
                self.round
            );
            return Err(PoolError::RoundInProgress);
        }

        if settler == &self.custody {
            return Err(PoolError::Unauthorized {
                caller: settler.to_string(),
            });
        }

        let winner = self
            .last_bettor
            .clone()
            .ok_or_else(|| PoolError::Internal("settleable round has no bettor".to_string()))?;
        let payout = compute_payout(
            self.pool_balance,
            self.config.rake_bps,
            self.config.settle_reward,
        )?;
        let transfers = payout.transfers(&self.custody, &winner, &self.config.vault, settler);

        if let Err(e) = ledger.transfer_batch(&transfers).await {
            tracing::warn!("Pool {} payout failed: {}", self.id, e);
            return Err(PoolError::PayoutFailed(e.to_string()));
        }

        let round = self.round;
        self.recent_winner = Some(winner.clone());
        self.recent_win_amount = payout.winnings;
        self.pool_balance = Amount::ZERO;
        self.bet_count = 0;
        self.last_bettor = None;
        self.round += 1;

        tracing::info!(
            "Pool {} round {} settled: {} wins {} (rake {}, reward {} to {})",
            self.id,
            round,
            winner,
            payout.winnings,
            payout.rake,
            payout.reward,
            settler
        );

        Ok(RoundSettled {
            pool_id: self.id,
            round,
            winner,
            amount: payout.winnings,
            settler: settler.clone(),
            rake: payout.rake,
            reward: payout.reward,
            settled_at: now,
        })
    }

    pub fn set_rake(&mut self, caller: &AccountId, new_bps: u16) -> Result<()> {
        self.authorize(caller)?;
        if new_bps >= BPS_DENOMINATOR {
            return Err(PoolError::RakeTooHigh { bps: new_bps });
        }

        tracing::info!(
            "Pool {} rake changed {} -> {} bps",
            self.id,
            self.config.rake_bps,
            new_bps
        );
        self.config.rake_bps = new_bps;
        Ok(())
    }

    /// No upper bound here, settlement refuses a reward the pool cannot
    /// cover.
    pub fn set_settle_reward(&mut self, caller: &AccountId, new_amount: Amount) -> Result<()> {
        self.authorize(caller)?;

        tracing::info!(
            "Pool {} settle reward changed {} -> {}",
            self.id,
            self.config.settle_reward,
            new_amount
        );
        self.config.settle_reward = new_amount;
        Ok(())
    }

    pub fn transfer_ownership(&mut self, caller: &AccountId, new_owner: AccountId) -> Result<()> {
        self.authorize(caller)?;
        if new_owner.is_empty() {
            return Err(PoolError::InvalidConfig(
                "Owner account cannot be empty".to_string(),
            ));
        }

        tracing::info!(
            "Pool {} ownership transferred {} -> {}",
            self.id,
            self.config.owner,
            new_owner
        );
        self.config.owner = new_owner;
        Ok(())
    }

    fn authorize(&self, caller: &AccountId) -> Result<()> {
        if caller != &self.config.owner {
            tracing::warn!("Pool {} rejected admin call from {}", self.id, caller);
            return Err(PoolError::Unauthorized {
                caller: caller.to_string(),
            });
        }
        Ok(())
    }

    /// Checks a restored snapshot for internal consistency.
    pub fn check_invariants(&self) -> Result<()> {
        if self.config.rake_bps >= BPS_DENOMINATOR {
            return Err(PoolError::RakeTooHigh {
                bps: self.config.rake_bps,
            });
        }

        let expected = self
            .config
            .bet_size
            .checked_mul(u64::from(self.bet_count))
            .ok_or_else(|| PoolError::Internal("pool balance overflow".to_string()))?;
        if expected != self.pool_balance {
            return Err(PoolError::Internal(format!(
                "pool balance {} does not match {} bets of {}",
                self.pool_balance, self.bet_count, self.config.bet_size
            )));
        }

        if self.last_bettor.is_some() != (self.bet_count > 0) {
            return Err(PoolError::Internal(
                "last bettor out of sync with bet count".to_string(),
            ));
        }

        if self.custody != custody_account(self.id) {
            return Err(PoolError::Internal("custody account mismatch".to_string()));
        }

        Ok(())
    }

    pub fn get_info(&self, clock: &dyn Clock) -> PoolInfo {
        PoolInfo {
            id: self.id,
            phase: self.phase(clock),
            round: self.round,
            bet_size: self.config.bet_size,
            interval_secs: self.config.interval.as_secs(),
            rake_bps: self.config.rake_bps,
            settle_reward: self.config.settle_reward,
            vault: self.config.vault.clone(),
            owner: self.config.owner.clone(),
            custody: self.custody.clone(),
            pool_balance: self.pool_balance,
            bet_count: self.bet_count,
            last_bettor: self.last_bettor.clone(),
            last_bet_timestamp: self.last_bet_timestamp,
            recent_winner: self.recent_winner.clone(),
            recent_win_amount: self.recent_win_amount,
            settleable_in_secs: self.time_until_settleable(clock).map(|d| d.as_secs()),
        }
    }
}

fn custody_account(id: Uuid) -> AccountId {
    AccountId::new(format!("pool:{}", id))
}

/// Pool info for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolInfo {
    pub id: Uuid,
    pub phase: RoundPhase,
    pub round: u64,
    pub bet_size: Amount,
    pub interval_secs: u64,
    pub rake_bps: u16,
    pub settle_reward: Amount,
    pub vault: AccountId,
    pub owner: AccountId,
    pub custody: AccountId,
    pub pool_balance: Amount,
    pub bet_count: u32,
    pub last_bettor: Option<AccountId>,
    pub last_bet_timestamp: DateTime<Utc>,
    pub recent_winner: Option<AccountId>,
    pub recent_win_amount: Amount,
    pub settleable_in_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chicken_core::{CoreError, ManualClock, MemoryLedger, Transfer};
    use std::sync::atomic::{AtomicBool, Ordering};

    const BET: u64 = 10;

    fn id(name: &str) -> AccountId {
        AccountId::new(name)
    }

    fn units(n: u64) -> Amount {
        Amount::from_units(n)
    }

    fn config() -> PoolConfig {
        PoolConfig::new(id("owner"), id("vault"))
            .with_bet_size(units(BET))
            .with_interval(Duration::from_secs(30))
            .with_rake_bps(500)
            .with_settle_reward(units(1))
    }

    struct Fixture {
        pool: BettingPool,
        ledger: MemoryLedger,
        clock: ManualClock,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_config(config())
        }

        fn with_config(config: PoolConfig) -> Self {
            let clock = ManualClock::default();
            let pool = BettingPool::new(config, &clock).unwrap();
            let ledger = MemoryLedger::new();
            for name in ["alice", "bob", "carol"] {
                ledger.credit(&id(name), units(50)).unwrap();
            }
            Self { pool, ledger, clock }
        }

        async fn bet(&mut self, name: &str) -> Result<BetPlaced> {
            self.clock.advance(TimeDelta::seconds(1));
            self.pool
                .place_bet(&self.ledger, &self.clock, &id(name), units(BET))
                .await
        }

        async fn settle(&mut self, settler: &str) -> Result<RoundSettled> {
            self.pool
                .settle_round(&self.ledger, &self.clock, &id(settler))
                .await
        }

        fn wait_interval(&self) {
            self.clock.advance(TimeDelta::seconds(31));
        }

        async fn balance(&self, name: &str) -> Amount {
            self.ledger.balance_of(&id(name)).await.unwrap()
        }
    }

    #[test]
    fn test_constructor_sets_state() {
        let clock = ManualClock::default();
        let pool = BettingPool::new(config(), &clock).unwrap();

        assert_eq!(pool.bet_size(), units(BET));
        assert_eq!(pool.interval(), Duration::from_secs(30));
        assert_eq!(pool.rake_bps(), 500);
        assert_eq!(pool.settle_reward(), units(1));
        assert_eq!(pool.vault(), &id("vault"));
        assert_eq!(pool.owner(), &id("owner"));
        assert_eq!(pool.pool_balance(), Amount::ZERO);
        assert_eq!(pool.last_bettor(), None);
        assert_eq!(pool.last_bet_timestamp(), clock.now());
        assert_eq!(pool.round(), 1);
        assert_eq!(pool.phase(&clock), RoundPhase::Empty);
        assert!(pool.check_invariants().is_ok());
    }

    #[test]
    fn test_constructor_rejects_full_rake() {
        let clock = ManualClock::default();
        let err = BettingPool::new(config().with_rake_bps(10_000), &clock).unwrap_err();
        assert!(matches!(err, PoolError::RakeTooHigh { bps: 10_000 }));

        let err = BettingPool::new(config().with_bet_size(Amount::ZERO), &clock).unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_bet_updates_state() {
        let mut f = Fixture::new();
        let before = f.pool.last_bet_timestamp();

        let event = f.bet("alice").await.unwrap();

        assert_eq!(f.pool.last_bettor(), Some(&id("alice")));
        assert!(f.pool.last_bet_timestamp() > before);
        assert_eq!(f.pool.pool_balance(), units(BET));
        assert_eq!(f.balance("alice").await, units(40));
        assert_eq!(f.ledger.balance_of(f.pool.custody()).await.unwrap(), units(BET));

        assert_eq!(event.bettor, id("alice"));
        assert_eq!(event.amount, units(BET));
        assert_eq!(event.timestamp, f.pool.last_bet_timestamp());
        assert_eq!(event.pool_balance, units(BET));
    }

    #[tokio::test]
    async fn test_last_bettor_tracks_latest_bet() {
        let mut f = Fixture::new();
        let mut previous = f.pool.last_bet_timestamp();

        for name in ["alice", "bob", "alice", "carol", "bob"] {
            f.bet(name).await.unwrap();
            assert_eq!(f.pool.last_bettor(), Some(&id(name)));
            assert!(f.pool.last_bet_timestamp() > previous);
            previous = f.pool.last_bet_timestamp();
        }

        assert_eq!(f.pool.bet_count(), 5);
        assert_eq!(f.pool.pool_balance(), units(5 * BET));
        assert!(f.pool.check_invariants().is_ok());
    }

    #[tokio::test]
    async fn test_timestamp_advances_when_clock_stands_still() {
        let mut f = Fixture::new();
        let created = f.pool.last_bet_timestamp();

        let mut previous = created;
        for name in ["alice", "bob", "carol"] {
            let event = f
                .pool
                .place_bet(&f.ledger, &f.clock, &id(name), units(BET))
                .await
                .unwrap();
            assert!(event.timestamp > previous);
            assert_eq!(event.timestamp, f.pool.last_bet_timestamp());
            previous = event.timestamp;
        }

        // the nudge stays far below the interval
        f.clock.advance(TimeDelta::seconds(30));
        assert!(!f.pool.is_settleable(&f.clock));
        f.clock.advance(TimeDelta::seconds(1));
        assert!(f.pool.is_settleable(&f.clock));
        assert!(previous - created < TimeDelta::milliseconds(1));
    }

    #[tokio::test]
    async fn test_wrong_amount_is_rejected() {
        let mut f = Fixture::new();
        let before = f.pool.clone();

        for amount in [BET - 1, BET + 1, 0] {
            let err = f
                .pool
                .place_bet(&f.ledger, &f.clock, &id("alice"), units(amount))
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                PoolError::WrongBetAmount { expected: BET, got } if got == amount
            ));
            assert!(err.is_admission());
        }

        assert_eq!(f.pool, before);
        assert_eq!(f.balance("alice").await, units(50));
    }

    #[tokio::test]
    async fn test_insufficient_funds_leaves_state_untouched() {
        let mut f = Fixture::new();
        f.bet("alice").await.unwrap();
        let before = f.pool.clone();

        let err = f.bet("dave").await.unwrap_err();

        assert!(matches!(
            err,
            PoolError::InsufficientFunds { need: BET, available: 0 }
        ));
        assert_eq!(f.pool, before);
        assert_eq!(f.pool.last_bettor(), Some(&id("alice")));
    }

    #[tokio::test]
    async fn test_single_bet_never_settles() {
        let mut f = Fixture::new();
        f.bet("alice").await.unwrap();
        f.wait_interval();

        assert!(!f.pool.is_settleable(&f.clock));
        let err = f.settle("carol").await.unwrap_err();
        assert!(matches!(err, PoolError::RoundInProgress));
        assert!(err.is_timing());
        assert_eq!(f.pool.pool_balance(), units(BET));

        // a lone bettor can still be joined after the interval
        f.bet("bob").await.unwrap();
        assert_eq!(f.pool.bet_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_pool_is_not_settleable() {
        let mut f = Fixture::new();
        f.wait_interval();
        assert!(!f.pool.is_settleable(&f.clock));
        assert!(matches!(
            f.settle("carol").await,
            Err(PoolError::RoundInProgress)
        ));
    }

    #[tokio::test]
    async fn test_settlement_waits_for_interval() {
        let mut f = Fixture::new();
        f.bet("alice").await.unwrap();
        f.bet("bob").await.unwrap();

        f.clock.advance(TimeDelta::seconds(29));
        assert!(!f.pool.is_settleable(&f.clock));
        assert!(matches!(
            f.pool.phase(&f.clock),
            RoundPhase::Open { bets: 2 }
        ));
        assert_eq!(
            f.pool.time_until_settleable(&f.clock),
            Some(Duration::from_secs(1))
        );
        assert!(matches!(
            f.settle("carol").await,
            Err(PoolError::RoundInProgress)
        ));

        // exactly one interval is enough
        f.clock.advance(TimeDelta::seconds(1));
        assert!(f.pool.is_settleable(&f.clock));
        assert_eq!(
            f.pool.phase(&f.clock),
            RoundPhase::Settleable { bets: 2 }
        );
    }

    #[tokio::test]
    async fn test_closed_round_rejects_bets() {
        let mut f = Fixture::new();
        f.bet("alice").await.unwrap();
        f.bet("bob").await.unwrap();
        f.wait_interval();
        let before = f.pool.clone();

        assert!(f.pool.is_settleable(&f.clock));
        assert!(!f.pool.can_place_bet(&f.clock));
        let err = f.bet("carol").await.unwrap_err();

        assert!(matches!(err, PoolError::RoundClosed));
        assert!(f.pool.is_settleable(&f.clock));
        assert_eq!(f.pool.pool_balance(), before.pool_balance());
        assert_eq!(f.pool.last_bettor(), Some(&id("bob")));
        assert_eq!(f.balance("carol").await, units(50));
    }

    #[tokio::test]
    async fn test_reference_settlement() {
        let mut f = Fixture::new();
        f.bet("alice").await.unwrap();
        f.bet("bob").await.unwrap();
        f.wait_interval();

        let event = f.settle("carol").await.unwrap();

        // 20 * 500 / 10000 = 1 rake, 1 reward, 18 to bob
        assert_eq!(event.winner, id("bob"));
        assert_eq!(event.amount, units(18));
        assert_eq!(event.rake, units(1));
        assert_eq!(event.reward, units(1));
        assert_eq!(event.settler, id("carol"));
        assert_eq!(event.round, 1);

        assert_eq!(f.balance("bob").await, units(40 + 18));
        assert_eq!(f.balance("vault").await, units(1));
        assert_eq!(f.balance("carol").await, units(51));
        assert_eq!(f.ledger.balance_of(f.pool.custody()).await.unwrap(), Amount::ZERO);

        assert_eq!(f.pool.pool_balance(), Amount::ZERO);
        assert_eq!(f.pool.last_bettor(), None);
        assert_eq!(f.pool.recent_winner(), Some(&id("bob")));
        assert_eq!(f.pool.recent_win_amount(), units(18));
        assert_eq!(f.pool.round(), 2);
        assert_eq!(f.pool.phase(&f.clock), RoundPhase::Empty);
        assert!(f.pool.check_invariants().is_ok());
    }

    #[tokio::test]
    async fn test_winner_can_settle_own_round() {
        let mut f = Fixture::new();
        f.bet("alice").await.unwrap();
        f.bet("bob").await.unwrap();
        f.wait_interval();

        let event = f.settle("bob").await.unwrap();

        assert_eq!(event.winner, event.settler);
        assert_eq!(f.balance("bob").await, units(40 + 18 + 1));
    }

    #[tokio::test]
    async fn test_settlement_conserves_funds() {
        let mut f = Fixture::with_config(config().with_rake_bps(1_234).with_settle_reward(units(3)));
        let supply = f.ledger.total_supply();

        for name in ["alice", "bob", "carol", "alice", "bob"] {
            f.bet(name).await.unwrap();
        }
        f.wait_interval();
        let total = f.pool.pool_balance();

        let event = f.settle("carol").await.unwrap();

        let sum = event.amount.to_units() + event.rake.to_units() + event.reward.to_units();
        assert_eq!(sum, total.to_units());
        // 50 * 1234 / 10000 = 6.17
        assert_eq!(event.rake, units(6));
        assert_eq!(f.pool.pool_balance(), Amount::ZERO);
        assert_eq!(f.ledger.total_supply(), supply);
    }

    #[tokio::test]
    async fn test_rounds_repeat() {
        let mut f = Fixture::new();

        for (round, winner) in [(1, "bob"), (2, "alice")] {
            if winner == "bob" {
                f.bet("alice").await.unwrap();
                f.bet("bob").await.unwrap();
            } else {
                f.bet("bob").await.unwrap();
                f.bet("alice").await.unwrap();
            }
            f.wait_interval();
            let event = f.settle("carol").await.unwrap();
            assert_eq!(event.round, round);
            assert_eq!(event.winner, id(winner));
        }

        assert_eq!(f.pool.round(), 3);
        assert_eq!(f.pool.recent_winner(), Some(&id("alice")));
    }

    #[tokio::test]
    async fn test_oversized_reward_is_guarded() {
        let mut f = Fixture::new();
        f.bet("alice").await.unwrap();
        f.bet("bob").await.unwrap();
        f.wait_interval();
        f.pool.set_settle_reward(&id("owner"), units(20)).unwrap();
        let before = f.pool.clone();

        let err = f.settle("carol").await.unwrap_err();

        assert!(matches!(err, PoolError::InsufficientPoolForReward { .. }));
        assert_eq!(f.pool, before);
        assert_eq!(f.ledger.balance_of(f.pool.custody()).await.unwrap(), units(20));
    }

    #[tokio::test]
    async fn test_custody_cannot_settle() {
        let mut f = Fixture::new();
        f.bet("alice").await.unwrap();
        f.bet("bob").await.unwrap();
        f.wait_interval();
        let before = f.pool.clone();
        let custody = f.pool.custody().clone();

        let err = f
            .pool
            .settle_round(&f.ledger, &f.clock, &custody)
            .await
            .unwrap_err();

        assert!(matches!(err, PoolError::Unauthorized { .. }));
        assert_eq!(f.pool, before);
        assert_eq!(f.ledger.balance_of(&custody).await.unwrap(), units(2 * BET));

        let event = f.settle("carol").await.unwrap();
        assert_eq!(event.reward, units(1));
        assert_eq!(f.ledger.balance_of(&custody).await.unwrap(), Amount::ZERO);
    }

    /// Ledger that accepts single transfers but fails every batch.
    struct BrokenPayouts {
        inner: MemoryLedger,
        fail: AtomicBool,
    }

    #[async_trait]
    impl Ledger for BrokenPayouts {
        async fn balance_of(&self, account: &AccountId) -> chicken_core::Result<Amount> {
            self.inner.balance_of(account).await
        }

        async fn transfer(
            &self,
            from: &AccountId,
            to: &AccountId,
            amount: Amount,
        ) -> chicken_core::Result<()> {
            self.inner.transfer(from, to, amount).await
        }

        async fn transfer_batch(&self, transfers: &[Transfer]) -> chicken_core::Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(CoreError::ledger("ledger unavailable"));
            }
            self.inner.transfer_batch(transfers).await
        }
    }

    #[tokio::test]
    async fn test_failed_payout_is_atomic() {
        let clock = ManualClock::default();
        let mut pool = BettingPool::new(config(), &clock).unwrap();
        let ledger = BrokenPayouts {
            inner: MemoryLedger::new(),
            fail: AtomicBool::new(true),
        };
        ledger.inner.credit(&id("alice"), units(50)).unwrap();
        ledger.inner.credit(&id("bob"), units(50)).unwrap();

        for name in ["alice", "bob"] {
            clock.advance(TimeDelta::seconds(1));
            pool.place_bet(&ledger, &clock, &id(name), units(BET))
                .await
                .unwrap();
        }
        clock.advance(TimeDelta::seconds(31));
        let before = pool.clone();

        let err = pool
            .settle_round(&ledger, &clock, &id("carol"))
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::PayoutFailed(_)));
        assert_eq!(pool, before);
        assert_eq!(ledger.inner.balance_of(pool.custody()).await.unwrap(), units(20));

        // once the ledger recovers the same round settles normally
        ledger.fail.store(false, Ordering::SeqCst);
        let event = pool.settle_round(&ledger, &clock, &id("carol")).await.unwrap();
        assert_eq!(event.amount, units(18));
    }

    #[test]
    fn test_set_rake_bounds() {
        let clock = ManualClock::default();
        let mut pool = BettingPool::new(config(), &clock).unwrap();
        let owner = id("owner");

        pool.set_rake(&owner, 1_000).unwrap();
        assert_eq!(pool.rake_bps(), 1_000);

        pool.set_rake(&owner, 9_999).unwrap();
        assert_eq!(pool.rake_bps(), 9_999);

        for bps in [10_000, u16::MAX] {
            assert!(matches!(
                pool.set_rake(&owner, bps),
                Err(PoolError::RakeTooHigh { .. })
            ));
        }
        assert_eq!(pool.rake_bps(), 9_999);
    }

    #[test]
    fn test_admin_calls_require_owner() {
        let clock = ManualClock::default();
        let mut pool = BettingPool::new(config(), &clock).unwrap();
        let stranger = id("mallory");

        assert!(matches!(
            pool.set_rake(&stranger, 100),
            Err(PoolError::Unauthorized { .. })
        ));
        assert!(matches!(
            pool.set_settle_reward(&stranger, units(5)),
            Err(PoolError::Unauthorized { .. })
        ));
        assert!(matches!(
            pool.transfer_ownership(&stranger, stranger.clone()),
            Err(PoolError::Unauthorized { .. })
        ));
        assert_eq!(pool.rake_bps(), 500);
        assert_eq!(pool.settle_reward(), units(1));

        pool.set_settle_reward(&id("owner"), units(5)).unwrap();
        assert_eq!(pool.settle_reward(), units(5));

        pool.transfer_ownership(&id("owner"), id("new-owner")).unwrap();
        assert!(pool.set_rake(&id("owner"), 100).is_err());
        pool.set_rake(&id("new-owner"), 100).unwrap();
        assert_eq!(pool.rake_bps(), 100);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let mut f = Fixture::new();
        f.bet("alice").await.unwrap();

        let json = serde_json::to_string(&f.pool).unwrap();
        let restored: BettingPool = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, f.pool);
        assert!(restored.check_invariants().is_ok());
    }

    #[test]
    fn test_info_reports_phase() {
        let clock = ManualClock::default();
        let pool = BettingPool::new(config(), &clock).unwrap();
        let info = pool.get_info(&clock);

        assert_eq!(info.id, pool.id());
        assert_eq!(info.phase, RoundPhase::Empty);
        assert_eq!(info.settleable_in_secs, None);
        assert_eq!(info.custody, *pool.custody());
    }
}
