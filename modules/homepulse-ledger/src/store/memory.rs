//! In-memory [`LedgerStore`] for deterministic tests. BTreeMaps keep
//! iteration order stable so assertions never flake.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use homepulse_common::{
    ArchivedLedger, EntityLedger, ParentArchived, RegionalRollup, RunSummary,
};

use crate::error::Result;

use super::LedgerStore;

#[derive(Default)]
pub struct MemoryStore {
    live: Mutex<BTreeMap<String, EntityLedger>>,
    archived: Mutex<BTreeMap<String, ArchivedLedger>>,
    parents: Mutex<BTreeMap<String, ParentArchived>>,
    rollups: Mutex<BTreeMap<String, RegionalRollup>>,
    summaries: Mutex<Vec<RunSummary>>,
    /// Number of upcoming `put_archived` calls to fail, for
    /// failure-isolation tests.
    fail_archive_puts: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` archive writes fail.
    pub fn fail_next_archive_puts(&self, n: u32) {
        self.fail_archive_puts.store(n, Ordering::SeqCst);
    }

    pub fn run_summaries(&self) -> Vec<RunSummary> {
        self.summaries.lock().expect("summaries lock").clone()
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().expect("live lock").len()
    }

    pub fn archived_count(&self) -> usize {
        self.archived.lock().expect("archived lock").len()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn get_live(&self, entity_id: &str) -> Result<Option<EntityLedger>> {
        Ok(self.live.lock().expect("live lock").get(entity_id).cloned())
    }

    async fn put_live(&self, ledger: &EntityLedger) -> Result<()> {
        let mut live = self.live.lock().expect("live lock");
        let mut row = ledger.clone();
        if let Some(existing) = live.get(&ledger.entity_id) {
            row.created_at = existing.created_at;
        }
        live.insert(ledger.entity_id.clone(), row);
        Ok(())
    }

    async fn delete_live(&self, entity_id: &str) -> Result<bool> {
        Ok(self
            .live
            .lock()
            .expect("live lock")
            .remove(entity_id)
            .is_some())
    }

    async fn touch_live(&self, entity_id: &str, at: DateTime<Utc>) -> Result<()> {
        if let Some(ledger) = self.live.lock().expect("live lock").get_mut(entity_id) {
            ledger.last_updated = at;
        }
        Ok(())
    }

    async fn list_live(&self) -> Result<Vec<EntityLedger>> {
        Ok(self.live.lock().expect("live lock").values().cloned().collect())
    }

    async fn live_by_parent(&self, parent_id: &str) -> Result<Vec<EntityLedger>> {
        Ok(self
            .live
            .lock()
            .expect("live lock")
            .values()
            .filter(|l| l.parent_id == parent_id)
            .cloned()
            .collect())
    }

    async fn live_by_region(&self, region_id: &str) -> Result<Vec<EntityLedger>> {
        Ok(self
            .live
            .lock()
            .expect("live lock")
            .values()
            .filter(|l| l.region_id == region_id)
            .cloned()
            .collect())
    }

    async fn get_archived(&self, entity_id: &str) -> Result<Option<ArchivedLedger>> {
        Ok(self
            .archived
            .lock()
            .expect("archived lock")
            .get(entity_id)
            .cloned())
    }

    async fn put_archived(&self, record: &ArchivedLedger) -> Result<()> {
        let remaining = self.fail_archive_puts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_archive_puts.store(remaining - 1, Ordering::SeqCst);
            return Err(anyhow::anyhow!("injected archive write failure").into());
        }
        self.archived
            .lock()
            .expect("archived lock")
            .insert(record.ledger.entity_id.clone(), record.clone());
        Ok(())
    }

    async fn delete_archived(&self, entity_id: &str) -> Result<bool> {
        Ok(self
            .archived
            .lock()
            .expect("archived lock")
            .remove(entity_id)
            .is_some())
    }

    async fn archived_by_region(&self, region_id: &str) -> Result<Vec<ArchivedLedger>> {
        Ok(self
            .archived
            .lock()
            .expect("archived lock")
            .values()
            .filter(|a| a.ledger.region_id == region_id)
            .cloned()
            .collect())
    }

    async fn prune_archived(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut archived = self.archived.lock().expect("archived lock");
        let before = archived.len();
        archived.retain(|_, a| a.archived_at >= cutoff);
        Ok((before - archived.len()) as u64)
    }

    async fn record_archived_parent(&self, event: &ParentArchived) -> Result<()> {
        self.parents
            .lock()
            .expect("parents lock")
            .entry(event.parent_id.clone())
            .or_insert_with(|| event.clone());
        Ok(())
    }

    async fn clear_archived_parent(&self, parent_id: &str) -> Result<()> {
        self.parents.lock().expect("parents lock").remove(parent_id);
        Ok(())
    }

    async fn archived_parents(&self) -> Result<Vec<ParentArchived>> {
        Ok(self
            .parents
            .lock()
            .expect("parents lock")
            .values()
            .cloned()
            .collect())
    }

    async fn get_rollup(&self, region_id: &str) -> Result<Option<RegionalRollup>> {
        Ok(self
            .rollups
            .lock()
            .expect("rollups lock")
            .get(region_id)
            .cloned())
    }

    async fn put_rollup(&self, rollup: &RegionalRollup) -> Result<()> {
        self.rollups
            .lock()
            .expect("rollups lock")
            .insert(rollup.region_id.clone(), rollup.clone());
        Ok(())
    }

    async fn region_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .live
            .lock()
            .expect("live lock")
            .values()
            .map(|l| l.region_id.clone())
            .chain(
                self.archived
                    .lock()
                    .expect("archived lock")
                    .values()
                    .map(|a| a.ledger.region_id.clone()),
            )
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn put_run_summary(&self, summary: &RunSummary) -> Result<()> {
        self.summaries
            .lock()
            .expect("summaries lock")
            .push(summary.clone());
        Ok(())
    }
}
