pub mod cascade;
pub mod comparator;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod metrics;
pub mod reconstruct;
mod retry;
pub mod rollup;
pub mod store;

pub use cascade::{CascadeEngine, CascadeSummary, REASON_PARENT_ARCHIVED};
pub use comparator::SnapshotDecision;
pub use error::{LedgerError, Result};
pub use ledger::{find_ledger, AppendOutcome, LedgerRecord, LedgerWriter, SkipReason};
pub use rollup::{RegionalAggregator, RollupOutcome};
pub use store::locks::EntityLocks;
pub use store::postgres::PgLedgerStore;
pub use store::LedgerStore;

#[cfg(any(test, feature = "test-support"))]
pub use store::memory::MemoryStore;
