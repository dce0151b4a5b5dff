//! Archival cascade — when a parent listing is retired, its entities'
//! ledgers move out of the live store, atomically per entity.
//!
//! Invoked from two call sites with identical semantics: synchronously
//! right after upstream marks a batch of parents archived, and from the
//! scheduled sweep, which also catches cascades the immediate trigger
//! missed, retires stale entities, and prunes expired archive rows.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use homepulse_common::{ArchivedLedger, EntityStatus, ParentArchived};

use crate::error::Result;
use crate::retry::with_retry;
use crate::store::locks::EntityLocks;
use crate::store::LedgerStore;

/// Reason stamped on ledgers swept because their parent went away, when
/// upstream supplied none.
pub const REASON_PARENT_ARCHIVED: &str = "community archived";

#[derive(Debug, Clone, Default)]
pub struct CascadeSummary {
    pub parents: u32,
    pub archived: u32,
    pub stale_archived: u32,
    pub pruned: u64,
    pub failed: Vec<String>,
}

pub struct CascadeEngine<S> {
    store: Arc<S>,
    locks: Arc<EntityLocks>,
    stale_after_days: i64,
    archive_retention_days: i64,
}

impl<S: LedgerStore> CascadeEngine<S> {
    pub fn new(
        store: Arc<S>,
        locks: Arc<EntityLocks>,
        stale_after_days: i64,
        archive_retention_days: i64,
    ) -> Self {
        Self {
            store,
            locks,
            stale_after_days,
            archive_retention_days,
        }
    }

    /// Immediate trigger: upstream just marked these parents archived.
    /// One failing entity never aborts the batch.
    pub async fn handle_archived_parents(&self, parents: &[ParentArchived]) -> CascadeSummary {
        let mut summary = CascadeSummary::default();
        for parent in parents {
            // The marker must land before the cascade: the sweep re-reads
            // markers to finish whatever this call leaves behind.
            if let Err(e) = self.store.record_archived_parent(parent).await {
                warn!(parent_id = parent.parent_id.as_str(), error = %e, "Failed to record archived parent");
                summary.failed.push(parent.parent_id.clone());
                continue;
            }
            summary.parents += 1;
            self.cascade_parent(parent, &mut summary).await;
        }
        summary
    }

    /// Scheduled sweep: re-drive missed cascades, retire entities no scrape
    /// has seen lately, prune expired archive rows. Safe to abort between
    /// entities; the next sweep picks up where this one stopped.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<CascadeSummary> {
        let mut summary = CascadeSummary::default();

        let parents = self.store.archived_parents().await?;
        for parent in &parents {
            self.cascade_parent(parent, &mut summary).await;
        }

        let live = self.store.list_live().await?;
        let cutoff = now - Duration::days(self.stale_after_days);
        let stale: Vec<_> = live.iter().filter(|l| l.last_updated < cutoff).collect();
        if !stale.is_empty() && stale.len() * 2 > live.len() {
            // A half-empty scrape looks exactly like mass delisting.
            warn!(
                stale = stale.len(),
                live = live.len(),
                "More than half the live set appears stale, skipping stale archival this run"
            );
        } else {
            let reason = format!("not observed for {} days", self.stale_after_days);
            for ledger in stale {
                match self.archive_entity(&ledger.entity_id, now, &reason).await {
                    Ok(true) => summary.stale_archived += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(entity_id = ledger.entity_id.as_str(), error = %e, "Failed to archive stale entity, continuing");
                        summary.failed.push(ledger.entity_id.clone());
                    }
                }
            }
        }

        let retention_cutoff = now - Duration::days(self.archive_retention_days);
        match self.store.prune_archived(retention_cutoff).await {
            Ok(pruned) => {
                summary.pruned = pruned;
                if pruned > 0 {
                    info!(pruned, "Pruned expired archive rows");
                }
            }
            Err(e) => warn!(error = %e, "Archive prune failed"),
        }

        Ok(summary)
    }

    async fn cascade_parent(&self, parent: &ParentArchived, summary: &mut CascadeSummary) {
        let ledgers = match self.store.live_by_parent(&parent.parent_id).await {
            Ok(ledgers) => ledgers,
            Err(e) => {
                warn!(parent_id = parent.parent_id.as_str(), error = %e, "Failed to list entities for archived parent");
                summary.failed.push(parent.parent_id.clone());
                return;
            }
        };

        let reason = if parent.reason.is_empty() {
            REASON_PARENT_ARCHIVED
        } else {
            parent.reason.as_str()
        };

        for ledger in ledgers {
            match self
                .archive_entity(&ledger.entity_id, parent.archived_at, reason)
                .await
            {
                Ok(true) => summary.archived += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(entity_id = ledger.entity_id.as_str(), error = %e, "Failed to archive entity, continuing batch");
                    summary.failed.push(ledger.entity_id.clone());
                }
            }
        }
    }

    /// Relocate one live ledger into the archive. Copy-then-delete: the
    /// record must exist at the archive location before it leaves the live
    /// one. A missing live record on re-run is a no-op, which is also what
    /// de-duplicates a retry after a crash between the two steps.
    async fn archive_entity(
        &self,
        entity_id: &str,
        archived_at: DateTime<Utc>,
        reason: &str,
    ) -> Result<bool> {
        let _guard = self.locks.acquire(entity_id).await;

        let Some(mut ledger) = self.store.get_live(entity_id).await? else {
            return Ok(false);
        };
        ledger.status = EntityStatus::Archived;

        let record = ArchivedLedger {
            ledger,
            archived_at,
            archive_reason: reason.to_string(),
        };

        with_retry("archive copy", entity_id, || async {
            self.store.put_archived(&record).await
        })
        .await?;
        with_retry("live delete", entity_id, || async {
            self.store.delete_live(entity_id).await
        })
        .await?;

        info!(entity_id, reason, "Ledger archived");
        Ok(true)
    }
}
