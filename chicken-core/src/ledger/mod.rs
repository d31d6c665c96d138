pub mod memory;

pub use memory::MemoryLedger;

use crate::error::{CoreError, Result};
use crate::types::{AccountId, Amount};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One leg of a value movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
}

impl Transfer {
    pub fn new(from: AccountId, to: AccountId, amount: Amount) -> Self {
        Self { from, to, amount }
    }
}

/// Balance-holding substrate the pool moves funds through.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Unknown accounts hold zero.
    async fn balance_of(&self, account: &AccountId) -> Result<Amount>;

    /// Moves `amount` from `from` to `to`, or fails with
    /// `CoreError::InsufficientFunds` leaving both balances untouched.
    async fn transfer(&self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<()>;

    /// Applies every leg or none of them. Zero-value legs and legs whose
    /// source and destination are the same account are skipped.
    async fn transfer_batch(&self, transfers: &[Transfer]) -> Result<()>;
}

/// Applies `transfers` to an in-memory balance map, failing on the first leg
/// whose source cannot cover it. `balances` is left partially updated on
/// error, callers work on a scratch copy.
pub(crate) fn apply_legs(
    balances: &mut HashMap<AccountId, Amount>,
    transfers: &[Transfer],
) -> Result<()> {
    for leg in transfers {
        if leg.amount.is_zero() || leg.from == leg.to {
            continue;
        }

        let available = balances.get(&leg.from).copied().unwrap_or_default();
        let remaining = available
            .checked_sub(leg.amount)
            .ok_or(CoreError::InsufficientFunds {
                need: leg.amount.to_units(),
                available: available.to_units(),
            })?;
        let credited = balances
            .get(&leg.to)
            .copied()
            .unwrap_or_default()
            .try_add(leg.amount)?;

        balances.insert(leg.from.clone(), remaining);
        balances.insert(leg.to.clone(), credited);
    }

    Ok(())
}
