//! Settlement arithmetic.
//!
//! Integer only. The rake is `total * rake_bps / 10000` rounded toward zero,
//! so any remainder stays with the winner.

use crate::{PoolError, Result};
use chicken_core::{AccountId, Amount, Transfer, BPS_DENOMINATOR};
use serde::{Deserialize, Serialize};

/// How a settled pool is split. `winnings + rake + reward == total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub total: Amount,
    pub rake: Amount,
    pub reward: Amount,
    pub winnings: Amount,
}

/// Floor of `total * rake_bps / 10000`, computed in 128 bits.
pub fn rake_of(total: Amount, rake_bps: u16) -> Amount {
    let rake = u128::from(total.to_units()) * u128::from(rake_bps) / u128::from(BPS_DENOMINATOR);
    // rake_bps < 10000 keeps this at or below total
    Amount::from_units(rake.min(u128::from(total.to_units())) as u64)
}

pub fn compute_payout(total: Amount, rake_bps: u16, settle_reward: Amount) -> Result<Payout> {
    if rake_bps >= BPS_DENOMINATOR {
        return Err(PoolError::RakeTooHigh { bps: rake_bps });
    }

    let rake = rake_of(total, rake_bps);
    let after_rake = total
        .checked_sub(rake)
        .ok_or_else(|| PoolError::Internal("rake exceeds pool".to_string()))?;
    let winnings = after_rake
        .checked_sub(settle_reward)
        .ok_or(PoolError::InsufficientPoolForReward {
            pool: total.to_units(),
            rake: rake.to_units(),
            reward: settle_reward.to_units(),
        })?;

    Ok(Payout {
        total,
        rake,
        reward: settle_reward,
        winnings,
    })
}

impl Payout {
    /// Ledger legs out of `custody`: winner, vault, settler. Zero-value legs
    /// are left out.
    pub fn transfers(
        &self,
        custody: &AccountId,
        winner: &AccountId,
        vault: &AccountId,
        settler: &AccountId,
    ) -> Vec<Transfer> {
        [
            (winner, self.winnings),
            (vault, self.rake),
            (settler, self.reward),
        ]
        .into_iter()
        .filter(|(_, amount)| !amount.is_zero())
        .map(|(to, amount)| Transfer::new(custody.clone(), to.clone(), amount))
        .collect()
    }
}
