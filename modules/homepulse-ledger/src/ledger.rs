//! Timeline ledger writer — the only code path that mutates price history.
//!
//! Appends are serialized per entity through [`EntityLocks`]; unrelated
//! entities write in parallel. Late batches append at the tail whatever
//! their timestamp says; chronological order is restored on read.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use homepulse_common::{
    ArchivedLedger, ChangeType, EntityIdentity, EntityLedger, EntityStatus, Observation,
    TimelineEntry,
};

use crate::comparator::{self, SnapshotDecision};
use crate::error::Result;
use crate::identity;
use crate::metrics;
use crate::retry::with_retry;
use crate::store::locks::EntityLocks;
use crate::store::LedgerStore;

/// What one observation did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// First sighting of this entity; a new ledger was created.
    Created,
    /// Price changed; one entry appended.
    Appended(ChangeType),
    /// Same price as the last entry; sighting noted, nothing appended.
    Unchanged,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Missing or non-positive price.
    MissingPrice,
    /// Natural key normalizes to nothing; no identity can be derived.
    InvalidKey,
    /// Location fields too empty to place the entity in a region.
    IncompleteLocation,
}

/// A ledger found by id, wherever it currently lives.
#[derive(Debug, Clone)]
pub enum LedgerRecord {
    Live(EntityLedger),
    Archived(ArchivedLedger),
}

/// Look an entity up in the live store first, then the archive.
pub async fn find_ledger<S: LedgerStore>(
    store: &S,
    entity_id: &str,
) -> Result<Option<LedgerRecord>> {
    if let Some(ledger) = store.get_live(entity_id).await? {
        return Ok(Some(LedgerRecord::Live(ledger)));
    }
    Ok(store.get_archived(entity_id).await?.map(LedgerRecord::Archived))
}

pub struct LedgerWriter<S> {
    store: Arc<S>,
    locks: Arc<EntityLocks>,
    windows: Vec<u32>,
}

impl<S: LedgerStore> LedgerWriter<S> {
    pub fn new(store: Arc<S>, locks: Arc<EntityLocks>, windows: Vec<u32>) -> Self {
        Self {
            store,
            locks,
            windows,
        }
    }

    /// Append a timeline entry iff the observed price differs from the last
    /// recorded one. Unchanged re-scrapes are idempotent no-ops.
    pub async fn append_if_changed(&self, obs: &Observation) -> Result<AppendOutcome> {
        let entity_id = match identity::entity_id(&obs.natural_key) {
            Ok(id) => id,
            Err(_) => return Ok(AppendOutcome::Skipped(SkipReason::InvalidKey)),
        };
        if obs.location.locality.trim().is_empty() && obs.location.county.trim().is_empty() {
            return Ok(AppendOutcome::Skipped(SkipReason::IncompleteLocation));
        }

        let _guard = self.locks.acquire(&entity_id).await;

        let existing = match self.store.get_live(&entity_id).await? {
            Some(ledger) => Some(ledger),
            None => self.restore_archived(&entity_id).await?,
        };
        let last_price = existing
            .as_ref()
            .and_then(|l| l.last_entry().map(|e| e.price));

        match comparator::evaluate(last_price, obs.price) {
            SnapshotDecision::Skip => Ok(AppendOutcome::Skipped(SkipReason::MissingPrice)),
            SnapshotDecision::Unchanged => {
                // Staleness tracking still wants the sighting time.
                if let Err(e) = self.store.touch_live(&entity_id, obs.observed_at).await {
                    warn!(entity_id, error = %e, "Failed to record sighting time");
                }
                Ok(AppendOutcome::Unchanged)
            }
            SnapshotDecision::Record(change_type) => {
                let Some(price) = obs.price else {
                    return Ok(AppendOutcome::Skipped(SkipReason::MissingPrice));
                };
                let entry = TimelineEntry {
                    observed_at: obs.observed_at,
                    price,
                    change_type,
                    source: obs.source.clone(),
                    context: entry_context(obs, last_price),
                };

                let created = existing.is_none();
                let ledger = match existing {
                    Some(mut ledger) => {
                        ledger.parent_id = obs.parent_id.clone();
                        ledger.region_id = identity::region_id(&obs.location);
                        ledger.identity = identity_of(obs);
                        ledger.status = EntityStatus::Active;
                        ledger.timeline.push(entry);
                        ledger.metrics = metrics::recompute(&ledger.timeline, &self.windows);
                        ledger.last_updated = obs.observed_at;
                        ledger
                    }
                    None => {
                        let timeline = vec![entry];
                        let metrics = metrics::recompute(&timeline, &self.windows);
                        EntityLedger {
                            entity_id: entity_id.clone(),
                            parent_id: obs.parent_id.clone(),
                            region_id: identity::region_id(&obs.location),
                            identity: identity_of(obs),
                            status: EntityStatus::Active,
                            timeline,
                            metrics,
                            created_at: obs.observed_at,
                            last_updated: obs.observed_at,
                        }
                    }
                };

                with_retry("ledger append", &entity_id, || async {
                    self.store.put_live(&ledger).await
                })
                .await?;

                // An active sighting proves the parent listing is alive;
                // drop any archived marker so the sweep leaves it be.
                if let Err(e) = self.store.clear_archived_parent(&obs.parent_id).await {
                    warn!(parent_id = obs.parent_id.as_str(), error = %e, "Failed to clear archived-parent marker");
                }

                Ok(if created {
                    AppendOutcome::Created
                } else {
                    AppendOutcome::Appended(change_type)
                })
            }
        }
    }

    /// A fresh sighting of an entity whose ledger was relocated to the
    /// archive brings the ledger back whole, so the timeline stays
    /// contiguous across re-listings.
    async fn restore_archived(&self, entity_id: &str) -> Result<Option<EntityLedger>> {
        let Some(archived) = self.store.get_archived(entity_id).await? else {
            return Ok(None);
        };
        info!(
            entity_id,
            reason = archived.archive_reason.as_str(),
            "Archived entity sighted again, restoring ledger"
        );

        let mut ledger = archived.ledger;
        ledger.status = EntityStatus::Active;

        with_retry("ledger restore", entity_id, || async {
            self.store.put_live(&ledger).await
        })
        .await?;
        with_retry("archive delete", entity_id, || async {
            self.store.delete_archived(entity_id).await
        })
        .await?;
        // Restoring is evidence of a re-listing; stop the sweep from
        // re-archiving under the old parent marker.
        if let Err(e) = self.store.clear_archived_parent(&ledger.parent_id).await {
            warn!(parent_id = ledger.parent_id.as_str(), error = %e, "Failed to clear archived-parent marker");
        }

        Ok(Some(ledger))
    }
}

fn identity_of(obs: &Observation) -> EntityIdentity {
    EntityIdentity {
        name: obs.name.clone(),
        category: obs.category,
        offered_by: obs.offered_by.clone(),
        location: obs.location.clone(),
    }
}

/// Entry context is the upstream snapshot plus the observed percent move,
/// informational only.
fn entry_context(obs: &Observation, last_price: Option<f64>) -> serde_json::Value {
    let pct = match (obs.price, last_price) {
        (Some(price), Some(last)) if last > 0.0 => Some((price - last) / last * 100.0),
        _ => None,
    };

    let mut context = obs.context.clone();
    if let Some(pct) = pct {
        let rounded = (pct * 100.0).round() / 100.0;
        match &mut context {
            serde_json::Value::Object(map) => {
                map.insert("change_pct".to_string(), json!(rounded));
            }
            serde_json::Value::Null => context = json!({ "change_pct": rounded }),
            _ => {}
        }
    }
    context
}
