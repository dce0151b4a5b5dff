//! End-to-end tracker runs over a fixed upstream batch and the in-memory
//! store.

use std::sync::Arc;

use chrono::{Duration, Utc};

use homepulse_common::{
    Config, Location, Observation, ParentArchived, PropertyCategory, RunKind, OVERALL_CATEGORY,
};
use homepulse_ledger::{identity, LedgerStore, MemoryStore, REASON_PARENT_ARCHIVED};
use homepulse_tracker::{RunLog, StaticSource, Tracker};

fn config() -> Config {
    Config {
        database_url: String::new(),
        metric_windows: vec![7, 30],
        daily_history_days: 30,
        stale_after_days: 3,
        archive_retention_days: 365,
        ingest_concurrency: 4,
    }
}

fn location() -> Location {
    Location {
        locality: "Temecula".into(),
        county: "Riverside".into(),
        region: "CA".into(),
    }
}

fn obs(key: &str, parent: &str, price: Option<f64>) -> Observation {
    Observation::builder()
        .natural_key(key.to_string())
        .parent_id(parent.to_string())
        .name(key.to_string())
        .price(price)
        .category(PropertyCategory::SingleFamily)
        .location(location())
        .observed_at(Utc::now() - Duration::minutes(5))
        .build()
}

#[tokio::test]
async fn ingest_run_records_archives_and_reports() {
    let store = Arc::new(MemoryStore::new());
    let tracker = Tracker::new(store.clone(), &config());

    let source = StaticSource {
        observations: vec![
            obs("1 Elm St", "listing-1", Some(450_000.0)),
            obs("2 Oak Ct", "listing-2", Some(300_000.0)),
            // Re-scrape of the same unit at the same price within the batch.
            obs("1 Elm St", "listing-1", Some(450_000.0)),
            // Price missing upstream.
            obs("3 Fir Ln", "listing-3", None),
            // Natural key lost in extraction.
            obs("  ", "listing-3", Some(200_000.0)),
        ],
        archived_parents: vec![ParentArchived {
            parent_id: "listing-2".into(),
            archived_at: Utc::now(),
            reason: String::new(),
        }],
    };

    let mut run_log = RunLog::new("test-run".into(), RunKind::Ingest);
    let stats = tracker.run_ingest(&source, &mut run_log).await.unwrap();

    assert_eq!(stats.observed, 5);
    assert_eq!(stats.ledgers_created, 2);
    assert_eq!(stats.unchanged, 1);
    assert_eq!(stats.skipped, 2);
    assert_eq!(stats.parents_archived, 1);
    assert_eq!(stats.entities_archived, 1);
    assert_eq!(stats.rollups_rebuilt, 1);
    assert!(stats.failed.is_empty());

    // Oak moved to the archive with the default cascade reason.
    let oak = identity::entity_id("2 Oak Ct").unwrap();
    assert!(store.get_live(&oak).await.unwrap().is_none());
    let archived = store.get_archived(&oak).await.unwrap().unwrap();
    assert_eq!(archived.archive_reason, REASON_PARENT_ARCHIVED);

    // The rollup reflects only the active entity.
    let region_id = identity::region_id(&location());
    let rollup = store.get_rollup(&region_id).await.unwrap().unwrap();
    assert_eq!(rollup.current[OVERALL_CATEGORY].count, 1);
    assert_eq!(rollup.current[OVERALL_CATEGORY].avg_price, Some(450_000.0));

    // The audit row always lands, with explicit counts.
    let summaries = store.run_summaries();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].kind, RunKind::Ingest);
    assert_eq!(summaries[0].observed, 5);
    assert_eq!(summaries[0].skipped, 2);
    assert!(summaries[0].failed_ids.is_empty());
}

#[tokio::test]
async fn rerunning_the_same_batch_changes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let tracker = Tracker::new(store.clone(), &config());

    let source = StaticSource {
        observations: vec![
            obs("1 Elm St", "listing-1", Some(450_000.0)),
            obs("2 Oak Ct", "listing-2", Some(300_000.0)),
        ],
        archived_parents: vec![],
    };

    let mut first_log = RunLog::new("run-1".into(), RunKind::Ingest);
    tracker.run_ingest(&source, &mut first_log).await.unwrap();

    let mut second_log = RunLog::new("run-2".into(), RunKind::Ingest);
    let second = tracker.run_ingest(&source, &mut second_log).await.unwrap();

    assert_eq!(second.ledgers_created, 0);
    assert_eq!(second.entries_appended, 0);
    assert_eq!(second.unchanged, 2);

    let elm = identity::entity_id("1 Elm St").unwrap();
    let ledger = store.get_live(&elm).await.unwrap().unwrap();
    assert_eq!(ledger.timeline.len(), 1);

    assert_eq!(store.run_summaries().len(), 2);
}

#[tokio::test]
async fn sweep_run_produces_a_summary_row() {
    let store = Arc::new(MemoryStore::new());
    let tracker = Tracker::new(store.clone(), &config());

    let source = StaticSource {
        observations: vec![obs("1 Elm St", "listing-1", Some(450_000.0))],
        archived_parents: vec![],
    };
    let mut ingest_log = RunLog::new("run-1".into(), RunKind::Ingest);
    tracker.run_ingest(&source, &mut ingest_log).await.unwrap();

    let mut sweep_log = RunLog::new("run-2".into(), RunKind::Sweep);
    let stats = tracker.run_sweep(&mut sweep_log).await.unwrap();
    assert_eq!(stats.entities_archived, 0);
    assert_eq!(stats.rollups_rebuilt, 1);

    let summaries = store.run_summaries();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[1].kind, RunKind::Sweep);
}
