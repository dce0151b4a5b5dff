//! Persistence for ledgers, archives, rollups, and run audit rows.
//!
//! Everything sits behind one trait so the engines can be exercised
//! deterministically against [`memory::MemoryStore`] — no network, no
//! database, no Docker. [`postgres::PgLedgerStore`] is the production
//! implementation and the single source of truth between runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use homepulse_common::{
    ArchivedLedger, EntityLedger, ParentArchived, RegionalRollup, RunSummary,
};

use crate::error::Result;

pub mod locks;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod postgres;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    // --- Live ledgers ---

    async fn get_live(&self, entity_id: &str) -> Result<Option<EntityLedger>>;

    /// Upsert a full ledger row. `created_at` of an existing row is kept.
    async fn put_live(&self, ledger: &EntityLedger) -> Result<()>;

    /// Returns whether a row was actually removed.
    async fn delete_live(&self, entity_id: &str) -> Result<bool>;

    /// Refresh `last_updated` without touching the timeline. Used when an
    /// observation arrives but the price is unchanged, so staleness
    /// tracking still sees the sighting.
    async fn touch_live(&self, entity_id: &str, at: DateTime<Utc>) -> Result<()>;

    async fn list_live(&self) -> Result<Vec<EntityLedger>>;

    async fn live_by_parent(&self, parent_id: &str) -> Result<Vec<EntityLedger>>;

    async fn live_by_region(&self, region_id: &str) -> Result<Vec<EntityLedger>>;

    // --- Archived ledgers ---

    async fn get_archived(&self, entity_id: &str) -> Result<Option<ArchivedLedger>>;

    async fn put_archived(&self, record: &ArchivedLedger) -> Result<()>;

    async fn delete_archived(&self, entity_id: &str) -> Result<bool>;

    async fn archived_by_region(&self, region_id: &str) -> Result<Vec<ArchivedLedger>>;

    /// Drop archived ledgers whose `archived_at` predates the cutoff.
    /// Returns the number removed.
    async fn prune_archived(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    // --- Parent archival markers ---

    /// Record that upstream archived a parent listing. Idempotent; the
    /// sweep re-reads these to catch cascades the immediate trigger missed.
    async fn record_archived_parent(&self, event: &ParentArchived) -> Result<()>;

    /// Drop the archived marker for a parent. Called when a fresh active
    /// sighting arrives under it, so the sweep stops re-archiving a
    /// re-listed parent's entities.
    async fn clear_archived_parent(&self, parent_id: &str) -> Result<()>;

    async fn archived_parents(&self) -> Result<Vec<ParentArchived>>;

    // --- Regional rollups ---

    async fn get_rollup(&self, region_id: &str) -> Result<Option<RegionalRollup>>;

    async fn put_rollup(&self, rollup: &RegionalRollup) -> Result<()>;

    /// Distinct region ids across live and archived ledgers.
    async fn region_ids(&self) -> Result<Vec<String>>;

    // --- Run audit ---

    async fn put_run_summary(&self, summary: &RunSummary) -> Result<()>;
}
