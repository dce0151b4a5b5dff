//! Tracker run log — persisted JSON timeline of every action taken during
//! a run.
//!
//! Each run produces a single `{DATA_DIR}/tracker-runs/{run_id}.json` file
//! containing an ordered list of events with timestamps.

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use homepulse_common::RunKind;

use crate::stats::TrackerStats;

// ---------------------------------------------------------------------------
// data_dir helper
// ---------------------------------------------------------------------------

/// Root data directory, controlled by `DATA_DIR` env var (default: `"data"`).
pub fn data_dir() -> PathBuf {
    PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()))
}

// ---------------------------------------------------------------------------
// RunLog
// ---------------------------------------------------------------------------

pub struct RunLog {
    pub run_id: String,
    pub kind: RunKind,
    pub started_at: DateTime<Utc>,
    events: Vec<RunEvent>,
    seq: u32,
}

#[derive(Serialize)]
struct RunEvent {
    seq: u32,
    ts: DateTime<Utc>,
    #[serde(flatten)]
    kind: EventKind,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    ObservationSkipped {
        natural_key: String,
        reason: String,
    },
    LedgerCreated {
        natural_key: String,
        price: f64,
    },
    PriceRecorded {
        natural_key: String,
        price: f64,
        change_type: String,
    },
    ParentsArchived {
        parents: u32,
        entities: u32,
    },
    SweepCompleted {
        archived: u32,
        stale: u32,
        pruned: u64,
    },
    RollupsRebuilt {
        rebuilt: u32,
        failed: u32,
    },
}

impl RunLog {
    pub fn new(run_id: String, kind: RunKind) -> Self {
        Self {
            run_id,
            kind,
            started_at: Utc::now(),
            events: Vec::new(),
            seq: 0,
        }
    }

    pub fn log(&mut self, kind: EventKind) {
        self.events.push(RunEvent {
            seq: self.seq,
            ts: Utc::now(),
            kind,
        });
        self.seq += 1;
    }

    /// Serialize the run log to JSON and write to disk.
    /// Returns the file path on success.
    pub fn save(&self, stats: &TrackerStats) -> Result<PathBuf> {
        let dir = data_dir().join("tracker-runs");
        std::fs::create_dir_all(&dir)?;

        let path = dir.join(format!("{}.json", self.run_id));

        let output = SerializedRunLog {
            run_id: &self.run_id,
            kind: self.kind,
            started_at: self.started_at,
            finished_at: Utc::now(),
            stats,
            events: &self.events,
        };

        std::fs::write(&path, serde_json::to_string_pretty(&output)?)?;
        info!(path = %path.display(), events = self.events.len(), "Tracker run log saved");

        Ok(path)
    }
}

// ---------------------------------------------------------------------------
// Serialization wrappers
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SerializedRunLog<'a> {
    run_id: &'a str,
    kind: RunKind,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    stats: &'a TrackerStats,
    events: &'a [RunEvent],
}
