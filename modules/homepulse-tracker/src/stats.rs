use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use homepulse_common::{RunKind, RunSummary};
use homepulse_ledger::CascadeSummary;

/// Counters accumulated over one tracker run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackerStats {
    pub observed: u32,
    pub ledgers_created: u32,
    pub entries_appended: u32,
    pub unchanged: u32,
    pub skipped: u32,
    pub parents_archived: u32,
    pub entities_archived: u32,
    pub stale_archived: u32,
    pub archive_pruned: u64,
    pub rollups_rebuilt: u32,
    pub failed: Vec<String>,
}

impl TrackerStats {
    pub fn absorb_cascade(&mut self, summary: &CascadeSummary) {
        self.parents_archived += summary.parents;
        self.entities_archived += summary.archived;
        self.stale_archived += summary.stale_archived;
        self.archive_pruned += summary.pruned;
        self.failed.extend(summary.failed.iter().cloned());
    }

    pub fn to_summary(
        &self,
        kind: RunKind,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> RunSummary {
        RunSummary {
            id: Uuid::new_v4(),
            kind,
            started_at,
            finished_at,
            observed: self.observed,
            ledgers_created: self.ledgers_created,
            entries_appended: self.entries_appended,
            unchanged: self.unchanged,
            skipped: self.skipped,
            parents_archived: self.parents_archived,
            entities_archived: self.entities_archived,
            stale_archived: self.stale_archived,
            archive_pruned: self.archive_pruned,
            rollups_rebuilt: self.rollups_rebuilt,
            failed_ids: self.failed.clone(),
        }
    }
}

impl std::fmt::Display for TrackerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Tracker Run Complete ===")?;
        writeln!(f, "Observations:       {}", self.observed)?;
        writeln!(f, "Ledgers created:    {}", self.ledgers_created)?;
        writeln!(f, "Entries appended:   {}", self.entries_appended)?;
        writeln!(f, "Unchanged:          {}", self.unchanged)?;
        writeln!(f, "Skipped:            {}", self.skipped)?;
        writeln!(f, "Parents archived:   {}", self.parents_archived)?;
        writeln!(f, "Entities archived:  {}", self.entities_archived)?;
        writeln!(f, "Stale archived:     {}", self.stale_archived)?;
        writeln!(f, "Archive pruned:     {}", self.archive_pruned)?;
        writeln!(f, "Rollups rebuilt:    {}", self.rollups_rebuilt)?;
        if self.failed.is_empty() {
            writeln!(f, "Failed:             0")?;
        } else {
            writeln!(f, "Failed:             {} ({})", self.failed.len(), self.failed.join(", "))?;
        }
        Ok(())
    }
}
