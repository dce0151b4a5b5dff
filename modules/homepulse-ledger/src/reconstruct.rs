//! Historical reconstruction — rebuilds day-by-day market state from
//! sparse, event-sampled timelines.
//!
//! Entries exist only when a price changed, so averaging "entries dated
//! exactly day d" would undercount active inventory on quiet days. Instead
//! each entity forward-fills: its last observed price stands until
//! superseded, or until the entity was archived.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use homepulse_common::{
    ArchivedLedger, DailyAverage, DailyCell, EntityLedger, OVERALL_CATEGORY,
};

use crate::metrics::daily_closes;

struct EntitySeries {
    category: &'static str,
    daily: Vec<(NaiveDate, f64)>,
    /// Archived entities stop counting after this date.
    active_until: Option<NaiveDate>,
}

fn build_series(ledger: &EntityLedger, active_until: Option<NaiveDate>) -> EntitySeries {
    let chronological = ledger.chronological_timeline();
    let refs: Vec<_> = chronological.iter().collect();
    EntitySeries {
        category: ledger.identity.category.key(),
        daily: daily_closes(&refs),
        active_until,
    }
}

/// Reconstruct per-calendar-day aggregates for a set of entities, per
/// category plus an overall pseudo-category.
///
/// Rows are produced only for dates on which some entity has an entry;
/// the reconstruction never synthesizes days with zero observations
/// anywhere. Archived entities still contribute to the market days they
/// were present for.
pub fn daily_market_state(live: &[EntityLedger], archived: &[ArchivedLedger]) -> Vec<DailyAverage> {
    let mut series: Vec<EntitySeries> = live.iter().map(|l| build_series(l, None)).collect();
    series.extend(
        archived
            .iter()
            .map(|a| build_series(&a.ledger, Some(a.archived_at.date_naive()))),
    );

    let dates: BTreeSet<NaiveDate> = series
        .iter()
        .flat_map(|s| s.daily.iter().map(|(d, _)| *d))
        .collect();

    let mut rows = Vec::with_capacity(dates.len());
    for date in dates {
        let mut sums: BTreeMap<&str, (f64, u32)> = BTreeMap::new();
        for s in &series {
            if matches!(s.active_until, Some(until) if date > until) {
                continue;
            }
            // Latest close on or before this date, forward-filled.
            let idx = s.daily.partition_point(|(d, _)| *d <= date);
            if idx == 0 {
                continue;
            }
            let price = s.daily[idx - 1].1;
            for key in [s.category, OVERALL_CATEGORY] {
                let cell = sums.entry(key).or_insert((0.0, 0));
                cell.0 += price;
                cell.1 += 1;
            }
        }

        if sums.is_empty() {
            continue;
        }

        let cells = sums
            .into_iter()
            .map(|(key, (sum, count))| {
                (
                    key.to_string(),
                    DailyCell {
                        avg_price: Some(sum / count as f64),
                        listing_count: count,
                    },
                )
            })
            .collect();
        rows.push(DailyAverage { date, cells });
    }
    rows
}
