use chicken_core::{AccountId, Amount};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetPlaced {
    pub pool_id: Uuid,
    pub round: u64,
    pub bettor: AccountId,
    pub amount: Amount,
    pub timestamp: DateTime<Utc>,
    /// Pool balance after this bet.
    pub pool_balance: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSettled {
    pub pool_id: Uuid,
    pub round: u64,
    pub winner: AccountId,
    /// Paid to the winner.
    pub amount: Amount,
    pub settler: AccountId,
    pub rake: Amount,
    pub reward: Amount,
    pub settled_at: DateTime<Utc>,
}

/// Notifications for external observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PoolEvent {
    BetPlaced(BetPlaced),
    RoundSettled(RoundSettled),
}

impl PoolEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            PoolEvent::BetPlaced(_) => "BetPlaced",
            PoolEvent::RoundSettled(_) => "RoundSettled",
        }
    }

    pub fn pool_id(&self) -> Uuid {
        match self {
            PoolEvent::BetPlaced(e) => e.pool_id,
            PoolEvent::RoundSettled(e) => e.pool_id,
        }
    }
}

impl From<BetPlaced> for PoolEvent {
    fn from(event: BetPlaced) -> Self {
        PoolEvent::BetPlaced(event)
    }
}

impl From<RoundSettled> for PoolEvent {
    fn from(event: RoundSettled) -> Self {
        PoolEvent::RoundSettled(event)
    }
}
