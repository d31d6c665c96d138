use crate::error::{CoreError, Result};
use crate::types::{AccountId, Amount};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Basis points in 100%.
pub const BPS_DENOMINATOR: u16 = 10_000;

pub const DEFAULT_BET_SIZE: Amount = Amount::from_units(10_000_000); // 10 USDC at 6 decimals
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_RAKE_BPS: u16 = 500; // 5%
pub const DEFAULT_SETTLE_REWARD: Amount = Amount::from_units(1_000_000);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Exact value of every accepted bet.
    pub bet_size: Amount,
    /// Inactivity after which a round with two or more bets can be settled.
    pub interval: Duration,
    pub rake_bps: u16,
    /// Paid to whoever triggers settlement. Zero disables the incentive.
    pub settle_reward: Amount,
    pub vault: AccountId,
    /// Administrator allowed to change `rake_bps` and `settle_reward`.
    pub owner: AccountId,
}

impl PoolConfig {
    pub fn new(owner: AccountId, vault: AccountId) -> Self {
        Self {
            bet_size: DEFAULT_BET_SIZE,
            interval: DEFAULT_INTERVAL,
            rake_bps: DEFAULT_RAKE_BPS,
            settle_reward: DEFAULT_SETTLE_REWARD,
            vault,
            owner,
        }
    }

    pub fn with_bet_size(mut self, bet_size: Amount) -> Self {
        self.bet_size = bet_size;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_rake_bps(mut self, rake_bps: u16) -> Self {
        self.rake_bps = rake_bps;
        self
    }

    pub fn with_settle_reward(mut self, settle_reward: Amount) -> Self {
        self.settle_reward = settle_reward;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.bet_size.is_zero() {
            return Err(CoreError::config("Bet size must be greater than 0"));
        }

        if self.interval.is_zero() {
            return Err(CoreError::config("Interval must be greater than 0"));
        }

        if self.rake_bps >= BPS_DENOMINATOR {
            return Err(CoreError::config(format!(
                "Rake must be below {} bps, got {}",
                BPS_DENOMINATOR, self.rake_bps
            )));
        }

        if self.vault.is_empty() {
            return Err(CoreError::config("Vault account cannot be empty"));
        }

        if self.owner.is_empty() {
            return Err(CoreError::config("Owner account cannot be empty"));
        }

        if self.bet_size.checked_mul(2).is_none() {
            return Err(CoreError::config("Bet size too large"));
        }

        Ok(())
    }
}
