use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

// --- Geography ---

/// Normalized location fields, received verbatim from upstream extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub locality: String,
    pub county: String,
    pub region: String,
}

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyCategory {
    SingleFamily,
    Condominium,
    Townhome,
    Other,
}

impl PropertyCategory {
    /// Stable key used for rollup category maps.
    pub fn key(&self) -> &'static str {
        match self {
            PropertyCategory::SingleFamily => "single_family",
            PropertyCategory::Condominium => "condominium",
            PropertyCategory::Townhome => "townhome",
            PropertyCategory::Other => "other",
        }
    }
}

impl std::fmt::Display for PropertyCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Pseudo-category aggregating every entity in a region regardless of type.
pub const OVERALL_CATEGORY: &str = "overall";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Active,
    Archived,
}

impl std::fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityStatus::Active => write!(f, "active"),
            EntityStatus::Archived => write!(f, "archived"),
        }
    }
}

impl FromStr for EntityStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(EntityStatus::Active),
            "archived" => Ok(EntityStatus::Archived),
            other => Err(format!("unknown entity status: {other}")),
        }
    }
}

/// Direction of a price movement, fixed at append time relative to the
/// previous chronological entry. Never recomputed retroactively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Initial,
    Increase,
    Decrease,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::Initial => write!(f, "initial"),
            ChangeType::Increase => write!(f, "increase"),
            ChangeType::Decrease => write!(f, "decrease"),
        }
    }
}

// --- Ledger records ---

/// One immutable price observation inside a ledger timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub observed_at: DateTime<Utc>,
    pub price: f64,
    pub change_type: ChangeType,
    /// Upstream stage that produced the observation.
    pub source: String,
    /// Contextual attributes at observation time (build status etc.).
    /// Informational only, never used in price math.
    pub context: serde_json::Value,
}

/// Latest known descriptive attributes of an entity. Overwritten on each
/// update, not versioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityIdentity {
    pub name: String,
    pub category: PropertyCategory,
    pub offered_by: Option<String>,
    pub location: Location,
}

/// Derived metrics over one entity's timeline. Fully recomputable, never
/// authoritative. Map keys are day-windows; an absent key means the metric
/// could not be computed from the available history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedMetrics {
    pub most_recent_price: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub avg_price: Option<f64>,
    pub moving_averages: BTreeMap<u32, f64>,
    pub percent_changes: BTreeMap<u32, f64>,
    /// Mean absolute day-over-day percent change.
    pub volatility: Option<f64>,
}

/// Permanent per-entity price history record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityLedger {
    /// Content-addressed id derived from the entity's natural key.
    pub entity_id: String,
    /// Upstream listing that owns this entity; drives the archival cascade.
    pub parent_id: String,
    /// Derived from the location tuple; groups entities into rollups.
    pub region_id: String,
    pub identity: EntityIdentity,
    pub status: EntityStatus,
    /// Append-only. Insertion order may lag `observed_at` for late batches;
    /// readers sort chronologically before aggregating.
    pub timeline: Vec<TimelineEntry>,
    pub metrics: AggregatedMetrics,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl EntityLedger {
    /// Timeline sorted by `observed_at`, non-decreasing. Stable, so entries
    /// sharing a timestamp keep insertion order.
    pub fn chronological_timeline(&self) -> Vec<TimelineEntry> {
        let mut entries = self.timeline.clone();
        entries.sort_by_key(|e| e.observed_at);
        entries
    }

    /// Most recent entry by observation time (latest-inserted wins ties).
    pub fn last_entry(&self) -> Option<&TimelineEntry> {
        self.timeline.iter().max_by_key(|e| e.observed_at)
    }
}

/// An entity ledger relocated out of the live store, plus archive metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedLedger {
    #[serde(flatten)]
    pub ledger: EntityLedger,
    pub archived_at: DateTime<Utc>,
    pub archive_reason: String,
}

// --- Regional rollups ---

/// Current-state metrics for one property category within a region.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryMetrics {
    pub count: u32,
    pub avg_price: Option<f64>,
    pub moving_averages: BTreeMap<u32, f64>,
    pub percent_changes: BTreeMap<u32, f64>,
}

/// One category's cell in a historical day row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCell {
    pub avg_price: Option<f64>,
    /// Write-once market-size fact. Preserved verbatim across recomputes
    /// even when later corrections change the prices for that day.
    pub listing_count: u32,
}

/// Per-calendar-day aggregate across a region, keyed by category
/// (plus [`OVERALL_CATEGORY`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAverage {
    pub date: NaiveDate,
    pub cells: BTreeMap<String, DailyCell>,
}

/// Recomputed per-region aggregate. Rebuilt from ledgers each run, never
/// incrementally patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionalRollup {
    pub region_id: String,
    pub location: Location,
    /// Per-category metrics over active entities, keyed by
    /// [`PropertyCategory::key`] plus [`OVERALL_CATEGORY`].
    pub current: BTreeMap<String, CategoryMetrics>,
    /// Bounded trailing window of daily aggregates, oldest first.
    pub daily_history: Vec<DailyAverage>,
    pub computed_at: DateTime<Utc>,
}

// --- Upstream interface payloads ---

/// One normalized entity observation produced by upstream extraction.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct Observation {
    /// Semi-stable natural key (detail-page address); identity input.
    pub natural_key: String,
    pub parent_id: String,
    pub name: String,
    #[builder(default)]
    pub price: Option<f64>,
    pub category: PropertyCategory,
    #[builder(default)]
    pub offered_by: Option<String>,
    pub location: Location,
    #[serde(default)]
    #[builder(default = serde_json::Value::Null)]
    pub context: serde_json::Value,
    pub observed_at: DateTime<Utc>,
    #[serde(default = "default_source")]
    #[builder(default = default_source())]
    pub source: String,
}

fn default_source() -> String {
    "listing_extract".to_string()
}

/// Upstream notice that a parent listing is no longer available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentArchived {
    pub parent_id: String,
    pub archived_at: DateTime<Utc>,
    /// Empty means the default reason applies downstream.
    #[serde(default)]
    pub reason: String,
}

// --- Run audit ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Ingest,
    Sweep,
}

impl std::fmt::Display for RunKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunKind::Ingest => write!(f, "ingest"),
            RunKind::Sweep => write!(f, "sweep"),
        }
    }
}

/// Persisted per-run audit row. Silent partial success is never reported as
/// full success: failed ids always travel with the counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: Uuid,
    pub kind: RunKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
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
    pub failed_ids: Vec<String>,
}
