use super::{amount_from_sql, amount_to_sql, Storage};
use crate::error::{CoreError, Result};
use crate::ledger::{Ledger, Transfer};
use crate::types::{AccountId, Amount};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::sync::Arc;

/// Ledger persisted in the `accounts` table. Batches run in one SQL
/// transaction.
pub struct SqliteLedger {
    storage: Arc<Storage>,
}

impl SqliteLedger {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Mints `amount` into `account`.
    pub async fn credit(&self, account: &AccountId, amount: Amount) -> Result<Amount> {
        let mut conn = self.storage.get_connection().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let balance = read_balance(&tx, account)?.try_add(amount)?;
        write_balance(&tx, account, balance)?;
        tx.commit()?;

        tracing::info!("Credited {} to {}", amount, account);
        Ok(balance)
    }

    pub async fn list_accounts(&self) -> Result<Vec<(AccountId, Amount)>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare("SELECT id, balance FROM accounts ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut accounts = Vec::new();
        for row in rows {
            let (id, balance) = row?;
            accounts.push((AccountId::new(id), amount_from_sql(balance)?));
        }

        Ok(accounts)
    }
}

pub(crate) fn read_balance(conn: &Connection, account: &AccountId) -> Result<Amount> {
    let balance: Option<i64> = conn
        .query_row(
            "SELECT balance FROM accounts WHERE id = ?1",
            params![account.as_str()],
            |row| row.get(0),
        )
        .optional()?;

    balance.map_or(Ok(Amount::ZERO), amount_from_sql)
}

pub(crate) fn write_balance(conn: &Connection, account: &AccountId, balance: Amount) -> Result<()> {
    conn.execute(
        "INSERT INTO accounts (id, balance, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET balance = excluded.balance, updated_at = excluded.updated_at",
        params![account.as_str(), amount_to_sql(balance)?, Utc::now().timestamp()],
    )?;
    Ok(())
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn balance_of(&self, account: &AccountId) -> Result<Amount> {
        let conn = self.storage.get_connection().await;
        read_balance(&conn, account)
    }

    async fn transfer(&self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<()> {
        self.transfer_batch(&[Transfer::new(from.clone(), to.clone(), amount)])
            .await
    }

    async fn transfer_batch(&self, transfers: &[Transfer]) -> Result<()> {
        let mut conn = self.storage.get_connection().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // dropping `tx` on an early return rolls everything back
        apply_transfers(&tx, transfers)?;
        tx.commit()?;
        Ok(())
    }
}

/// Applies every leg against `conn`. Callers provide the enclosing
/// transaction or savepoint.
pub(crate) fn apply_transfers(conn: &Connection, transfers: &[Transfer]) -> Result<()> {
    for leg in transfers {
        if leg.amount.is_zero() || leg.from == leg.to {
            continue;
        }

        let available = read_balance(conn, &leg.from)?;
        let remaining = available
            .checked_sub(leg.amount)
            .ok_or(CoreError::InsufficientFunds {
                need: leg.amount.to_units(),
                available: available.to_units(),
            })?;
        let credited = read_balance(conn, &leg.to)?.try_add(leg.amount)?;

        write_balance(conn, &leg.from, remaining)?;
        write_balance(conn, &leg.to, credited)?;
    }

    Ok(())
}
