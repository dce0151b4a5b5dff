//! Write-path behavior of the ledger store against the in-memory backend.

use std::sync::Arc;

use chrono::{Datelike, TimeZone, Utc};

use homepulse_common::{ChangeType, EntityStatus, Location, Observation, PropertyCategory};
use homepulse_ledger::{
    identity, AppendOutcome, CascadeEngine, EntityLocks, LedgerStore, LedgerWriter, MemoryStore,
    SkipReason,
};

fn obs(key: &str, day: u32, price: Option<f64>) -> Observation {
    Observation::builder()
        .natural_key(key.to_string())
        .parent_id("listing-1".to_string())
        .name("Alder Grove".to_string())
        .price(price)
        .category(PropertyCategory::SingleFamily)
        .location(Location {
            locality: "Temecula".into(),
            county: "Riverside".into(),
            region: "CA".into(),
        })
        .observed_at(Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap())
        .build()
}

fn writer(store: &Arc<MemoryStore>) -> LedgerWriter<MemoryStore> {
    LedgerWriter::new(store.clone(), Arc::new(EntityLocks::new()), vec![7, 30, 90])
}

#[tokio::test]
async fn unchanged_rescrape_appends_nothing() {
    let store = Arc::new(MemoryStore::new());
    let writer = writer(&store);

    let first = writer.append_if_changed(&obs("12 Alder Way", 1, Some(450_000.0))).await.unwrap();
    assert_eq!(first, AppendOutcome::Created);

    // Same price scraped again the next day: idempotent no-op.
    let second = writer.append_if_changed(&obs("12 Alder Way", 2, Some(450_000.0))).await.unwrap();
    assert_eq!(second, AppendOutcome::Unchanged);

    let entity_id = identity::entity_id("12 Alder Way").unwrap();
    let ledger = store.get_live(&entity_id).await.unwrap().unwrap();
    assert_eq!(ledger.timeline.len(), 1);
    assert_eq!(ledger.timeline[0].change_type, ChangeType::Initial);
    // The second sighting still moved the freshness clock.
    assert_eq!(
        ledger.last_updated,
        Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn price_changes_append_with_direction() {
    let store = Arc::new(MemoryStore::new());
    let writer = writer(&store);

    writer.append_if_changed(&obs("12 Alder Way", 1, Some(450_000.0))).await.unwrap();
    let up = writer.append_if_changed(&obs("12 Alder Way", 2, Some(460_000.0))).await.unwrap();
    assert_eq!(up, AppendOutcome::Appended(ChangeType::Increase));
    let down = writer.append_if_changed(&obs("12 Alder Way", 3, Some(440_000.0))).await.unwrap();
    assert_eq!(down, AppendOutcome::Appended(ChangeType::Decrease));

    let entity_id = identity::entity_id("12 Alder Way").unwrap();
    let ledger = store.get_live(&entity_id).await.unwrap().unwrap();
    assert_eq!(ledger.timeline.len(), 3);
    assert_eq!(ledger.metrics.most_recent_price, Some(440_000.0));
    assert_eq!(ledger.metrics.max_price, Some(460_000.0));
}

#[tokio::test]
async fn missing_and_zero_prices_are_never_recorded() {
    let store = Arc::new(MemoryStore::new());
    let writer = writer(&store);

    writer.append_if_changed(&obs("12 Alder Way", 1, Some(450_000.0))).await.unwrap();

    let missing = writer.append_if_changed(&obs("12 Alder Way", 2, None)).await.unwrap();
    assert_eq!(missing, AppendOutcome::Skipped(SkipReason::MissingPrice));
    let zero = writer.append_if_changed(&obs("12 Alder Way", 3, Some(0.0))).await.unwrap();
    assert_eq!(zero, AppendOutcome::Skipped(SkipReason::MissingPrice));

    let entity_id = identity::entity_id("12 Alder Way").unwrap();
    let ledger = store.get_live(&entity_id).await.unwrap().unwrap();
    // No phantom decrease to zero.
    assert_eq!(ledger.timeline.len(), 1);
}

#[tokio::test]
async fn blank_natural_key_is_skipped() {
    let store = Arc::new(MemoryStore::new());
    let writer = writer(&store);

    let outcome = writer.append_if_changed(&obs("   ", 1, Some(450_000.0))).await.unwrap();
    assert_eq!(outcome, AppendOutcome::Skipped(SkipReason::InvalidKey));
    assert_eq!(store.live_count(), 0);
}

#[tokio::test]
async fn late_batches_read_back_chronological() {
    let store = Arc::new(MemoryStore::new());
    let writer = writer(&store);

    writer.append_if_changed(&obs("12 Alder Way", 1, Some(100_000.0))).await.unwrap();
    writer.append_if_changed(&obs("12 Alder Way", 5, Some(120_000.0))).await.unwrap();
    // Delayed upstream batch arrives after the day-5 scrape.
    writer.append_if_changed(&obs("12 Alder Way", 3, Some(110_000.0))).await.unwrap();

    let entity_id = identity::entity_id("12 Alder Way").unwrap();
    let ledger = store.get_live(&entity_id).await.unwrap().unwrap();

    // Insertion order keeps the late entry at the tail...
    assert_eq!(ledger.timeline[2].price, 110_000.0);
    // ...but aggregation-facing reads are sorted by observation time.
    let chronological = ledger.chronological_timeline();
    let days: Vec<u32> = chronological
        .iter()
        .map(|e| e.observed_at.date_naive().day())
        .collect();
    assert_eq!(days, vec![1, 3, 5]);
    // Most-recent price follows observation time, not insertion order.
    assert_eq!(ledger.metrics.most_recent_price, Some(120_000.0));
}

#[tokio::test]
async fn resurfaced_entity_restores_its_archived_ledger() {
    let store = Arc::new(MemoryStore::new());
    let locks = Arc::new(EntityLocks::new());
    let writer = LedgerWriter::new(store.clone(), locks.clone(), vec![7]);
    let cascade = CascadeEngine::new(store.clone(), locks, 3, 365);

    writer.append_if_changed(&obs("12 Alder Way", 1, Some(450_000.0))).await.unwrap();

    let parent = homepulse_common::ParentArchived {
        parent_id: "listing-1".into(),
        archived_at: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        reason: String::new(),
    };
    cascade.handle_archived_parents(std::slice::from_ref(&parent)).await;
    assert_eq!(store.live_count(), 0);
    assert_eq!(store.archived_count(), 1);

    // The unit re-lists later at a new price: same ledger, contiguous
    // timeline, active again.
    let outcome = writer.append_if_changed(&obs("12 Alder Way", 30, Some(475_000.0))).await.unwrap();
    assert_eq!(outcome, AppendOutcome::Appended(ChangeType::Increase));

    let entity_id = identity::entity_id("12 Alder Way").unwrap();
    let ledger = store.get_live(&entity_id).await.unwrap().unwrap();
    assert_eq!(ledger.status, EntityStatus::Active);
    assert_eq!(ledger.timeline.len(), 2);
    assert_eq!(store.archived_count(), 0);
    // The parent marker is gone too, so the next sweep won't re-archive.
    assert!(store.archived_parents().await.unwrap().is_empty());
}
