//! Regional aggregation.
//!
//! Rollups are rebuilt from the ledgers on every run rather than patched
//! incrementally, so they can never drift from the store of record. The one
//! exception to "recompute everything" is the listing counts embedded in
//! daily history rows, which are write-once facts (see
//! [`merge_daily_history`]).

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use futures::{stream, StreamExt};
use tracing::{info, warn};

use homepulse_common::{
    CategoryMetrics, DailyAverage, EntityLedger, EntityStatus, RegionalRollup, OVERALL_CATEGORY,
};

use crate::error::{LedgerError, Result};
use crate::metrics;
use crate::reconstruct;
use crate::store::LedgerStore;

#[derive(Debug, Default)]
pub struct RollupOutcome {
    pub rebuilt: u32,
    pub failed: Vec<String>,
}

pub struct RegionalAggregator<S> {
    store: Arc<S>,
    windows: Vec<u32>,
    history_days: usize,
    concurrency: usize,
}

impl<S: LedgerStore> RegionalAggregator<S> {
    pub fn new(store: Arc<S>, windows: Vec<u32>, history_days: usize, concurrency: usize) -> Self {
        Self {
            store,
            windows,
            history_days,
            concurrency,
        }
    }

    /// Rebuild every region's rollup. A failing region is logged and
    /// reported, never fatal for the rest.
    pub async fn rebuild_all(&self, now: DateTime<Utc>) -> Result<RollupOutcome> {
        let regions = self.store.region_ids().await?;

        let results: Vec<_> = stream::iter(regions.into_iter().map(|region_id| async move {
            let result = self.build_and_store(&region_id, now).await;
            (region_id, result)
        }))
        .buffer_unordered(self.concurrency)
        .collect()
        .await;

        let mut outcome = RollupOutcome::default();
        for (region_id, result) in results {
            match result {
                Ok(()) => outcome.rebuilt += 1,
                Err(e) => {
                    warn!(region_id, error = %e, "Rollup rebuild failed");
                    outcome.failed.push(region_id);
                }
            }
        }
        info!(
            rebuilt = outcome.rebuilt,
            failed = outcome.failed.len(),
            "Regional rollups rebuilt"
        );
        Ok(outcome)
    }

    async fn build_and_store(&self, region_id: &str, now: DateTime<Utc>) -> Result<()> {
        let rollup = self.build_snapshot(region_id, now).await?;
        self.store.put_rollup(&rollup).await
    }

    /// Build one region's rollup over its full entity set. Archived
    /// entities still shaped past market days, so the daily history runs
    /// over live and archived both; current metrics cover active only.
    pub async fn build_snapshot(
        &self,
        region_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RegionalRollup> {
        let live = self.store.live_by_region(region_id).await?;
        let archived = self.store.archived_by_region(region_id).await?;

        let location = live
            .first()
            .map(|l| l.identity.location.clone())
            .or_else(|| archived.first().map(|a| a.ledger.identity.location.clone()))
            .ok_or_else(|| LedgerError::NotFound(region_id.to_string()))?;

        let daily_full = reconstruct::daily_market_state(&live, &archived);

        let active: Vec<&EntityLedger> = live
            .iter()
            .filter(|l| l.status == EntityStatus::Active)
            .collect();
        let current = self.current_metrics(&active, &daily_full);

        let previous = self.store.get_rollup(region_id).await?;
        let daily_history = merge_daily_history(
            previous
                .as_ref()
                .map(|p| p.daily_history.as_slice())
                .unwrap_or(&[]),
            daily_full,
            self.history_days,
        );

        Ok(RegionalRollup {
            region_id: region_id.to_string(),
            location,
            current,
            daily_history,
            computed_at: now,
        })
    }

    fn current_metrics(
        &self,
        active: &[&EntityLedger],
        daily_full: &[DailyAverage],
    ) -> BTreeMap<String, CategoryMetrics> {
        let mut groups: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for ledger in active {
            if let Some(price) = ledger.metrics.most_recent_price {
                groups
                    .entry(ledger.identity.category.key())
                    .or_default()
                    .push(price);
                groups.entry(OVERALL_CATEGORY).or_default().push(price);
            }
        }

        groups
            .into_iter()
            .map(|(key, prices)| {
                let series = category_series(daily_full, key);
                let mut moving_averages = BTreeMap::new();
                let mut percent_changes = BTreeMap::new();
                for &window in &self.windows {
                    if let Some(ma) = metrics::moving_average(&series, window) {
                        moving_averages.insert(window, ma);
                    }
                    if let Some(pc) = metrics::percent_change(&series, window) {
                        percent_changes.insert(window, pc);
                    }
                }
                (
                    key.to_string(),
                    CategoryMetrics {
                        count: prices.len() as u32,
                        avg_price: Some(prices.iter().sum::<f64>() / prices.len() as f64),
                        moving_averages,
                        percent_changes,
                    },
                )
            })
            .collect()
    }
}

/// Daily average-price series for one category, feeding the windowed
/// region-level metrics.
fn category_series(daily: &[DailyAverage], key: &str) -> Vec<(NaiveDate, f64)> {
    daily
        .iter()
        .filter_map(|row| {
            row.cells
                .get(key)
                .and_then(|cell| cell.avg_price)
                .map(|price| (row.date, price))
        })
        .collect()
}

/// Merge freshly reconstructed day rows against previously persisted ones,
/// keyed by date.
///
/// Listing counts are write-once: once a date has persisted counts they are
/// preserved verbatim, even when later corrections change that day's
/// prices. Price averages always take the fresh value. Dates the fresh
/// reconstruction no longer produces keep their old row. The result is
/// bounded to the trailing `history_days` rows.
pub fn merge_daily_history(
    previous: &[DailyAverage],
    fresh: Vec<DailyAverage>,
    history_days: usize,
) -> Vec<DailyAverage> {
    let mut by_date: BTreeMap<NaiveDate, DailyAverage> =
        fresh.into_iter().map(|row| (row.date, row)).collect();

    for prev_row in previous {
        match by_date.get_mut(&prev_row.date) {
            Some(fresh_row) => {
                for (key, prev_cell) in &prev_row.cells {
                    match fresh_row.cells.get_mut(key) {
                        Some(cell) => cell.listing_count = prev_cell.listing_count,
                        None => {
                            fresh_row.cells.insert(key.clone(), prev_cell.clone());
                        }
                    }
                }
            }
            None => {
                by_date.insert(prev_row.date, prev_row.clone());
            }
        }
    }

    let mut rows: Vec<DailyAverage> = by_date.into_values().collect();
    if rows.len() > history_days {
        rows.drain(..rows.len() - history_days);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use homepulse_common::DailyCell;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn row(day: u32, avg: f64, count: u32) -> DailyAverage {
        let mut cells = BTreeMap::new();
        cells.insert(
            OVERALL_CATEGORY.to_string(),
            DailyCell {
                avg_price: Some(avg),
                listing_count: count,
            },
        );
        DailyAverage {
            date: date(day),
            cells,
        }
    }

    #[test]
    fn counts_survive_price_corrections() {
        // Persisted: Jan 15 had 5 listings. A correction later changes the
        // average for that day; the count must not move.
        let previous = vec![row(15, 400_000.0, 5)];
        let fresh = vec![row(15, 410_000.0, 3)];

        let merged = merge_daily_history(&previous, fresh, 30);
        assert_eq!(merged.len(), 1);
        let cell = &merged[0].cells[OVERALL_CATEGORY];
        assert_eq!(cell.avg_price, Some(410_000.0));
        assert_eq!(cell.listing_count, 5);
    }

    #[test]
    fn vanished_dates_keep_their_rows() {
        let previous = vec![row(10, 100.0, 2), row(11, 110.0, 2)];
        let fresh = vec![row(11, 115.0, 2)];

        let merged = merge_daily_history(&previous, fresh, 30);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].date, date(10));
    }

    #[test]
    fn retention_drops_oldest_rows() {
        let fresh: Vec<DailyAverage> = (1..=10).map(|d| row(d, 100.0, 1)).collect();
        let merged = merge_daily_history(&[], fresh, 7);
        assert_eq!(merged.len(), 7);
        assert_eq!(merged.first().unwrap().date, date(4));
        assert_eq!(merged.last().unwrap().date, date(10));
    }
}
