//! chicken-core - ledger, clock and storage primitives
//!
//! The escrow pool consumes these through narrow interfaces: a [`Ledger`]
//! that moves value between accounts and a [`Clock`] that says what time it
//! is. Both have in-process and persistent implementations.

pub mod clock;
pub mod config;
pub mod error;
pub mod ledger;
pub mod storage;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{PoolConfig, BPS_DENOMINATOR};
pub use error::{CoreError, Result};
pub use ledger::{Ledger, MemoryLedger, Transfer};
pub use storage::{EventStore, PoolStore, PoolTx, SqliteLedger, Storage};
pub use types::{AccountId, Amount};
