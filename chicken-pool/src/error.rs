use thiserror::Error;

pub type Result<T> = std::result::Result<T, PoolError>;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Core error: {0}")]
    Core(#[from] chicken_core::CoreError),

    #[error("Wrong bet amount: expected {expected}, got {got}")]
    WrongBetAmount { expected: u64, got: u64 },

    #[error("Round is closed to new bets until it is settled")]
    RoundClosed,

    #[error("Insufficient funds: need {need}, have {available}")]
    InsufficientFunds { need: u64, available: u64 },

    #[error("Round in progress: settlement needs two bets and a full interval without betting")]
    RoundInProgress,

    #[error("Pool of {pool} minus rake {rake} cannot cover settle reward {reward}")]
    InsufficientPoolForReward { pool: u64, rake: u64, reward: u64 },

    #[error("Unauthorized: {caller} is not the pool owner")]
    Unauthorized { caller: String },

    #[error("Rake too high: {bps} bps, must be below 10000")]
    RakeTooHigh { bps: u16 },

    #[error("Payout failed: {0}")]
    PayoutFailed(String),

    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PoolError {
    /// Rejections of a bet: amount, round closed, or funds.
    pub fn is_admission(&self) -> bool {
        matches!(
            self,
            Self::WrongBetAmount { .. } | Self::RoundClosed | Self::InsufficientFunds { .. }
        )
    }

    /// Settlement attempted before the round is settleable.
    pub fn is_timing(&self) -> bool {
        matches!(self, Self::RoundInProgress)
    }

    pub(crate) fn from_ledger(err: chicken_core::CoreError) -> Self {
        match err {
            chicken_core::CoreError::InsufficientFunds { need, available } => {
                Self::InsufficientFunds { need, available }
            }
            other => Self::Core(other),
        }
    }
}
