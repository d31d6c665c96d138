use super::{apply_legs, Ledger, Transfer};
use crate::error::Result;
use crate::types::{AccountId, Amount};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Process-local ledger.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    balances: RwLock<HashMap<AccountId, Amount>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints `amount` into `account`.
    pub fn credit(&self, account: &AccountId, amount: Amount) -> Result<()> {
        let mut balances = self.balances.write();
        let current = balances.get(account).copied().unwrap_or_default();
        balances.insert(account.clone(), current.try_add(amount)?);
        Ok(())
    }

    pub fn balances(&self) -> HashMap<AccountId, Amount> {
        self.balances.read().clone()
    }

    /// Sum of all balances. Transfers never change it.
    pub fn total_supply(&self) -> Amount {
        self.balances
            .read()
            .values()
            .fold(Amount::ZERO, |acc, b| acc.checked_add(*b).unwrap_or(acc))
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn balance_of(&self, account: &AccountId) -> Result<Amount> {
        Ok(self.balances.read().get(account).copied().unwrap_or_default())
    }

    async fn transfer(&self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<()> {
        self.transfer_batch(&[Transfer::new(from.clone(), to.clone(), amount)])
            .await
    }

    async fn transfer_batch(&self, transfers: &[Transfer]) -> Result<()> {
        let mut balances = self.balances.write();
        let mut scratch = balances.clone();
        apply_legs(&mut scratch, transfers)?;
        *balances = scratch;

        tracing::debug!("Applied {} transfer(s)", transfers.len());
        Ok(())
    }
}
