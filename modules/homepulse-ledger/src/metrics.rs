//! Aggregate recomputation over one entity's timeline.
//!
//! Everything here derives from the chronological timeline and nothing else;
//! the stored metrics are a cache, never authoritative. Windowed metrics
//! operate on chronologically distinct *days*, not raw entries, because the
//! timeline is event-sampled: entries exist only when a price changed.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use homepulse_common::{AggregatedMetrics, TimelineEntry};

/// Day-windows used when no explicit configuration is given.
pub const DEFAULT_WINDOWS: [u32; 3] = [7, 30, 90];

/// Recompute the full metric block from a timeline. Insertion order is
/// irrelevant: entries are sorted by `observed_at` first.
pub fn recompute(timeline: &[TimelineEntry], windows: &[u32]) -> AggregatedMetrics {
    let mut entries: Vec<&TimelineEntry> = timeline.iter().collect();
    entries.sort_by_key(|e| e.observed_at);

    if entries.is_empty() {
        return AggregatedMetrics::default();
    }

    let prices: Vec<f64> = entries.iter().map(|e| e.price).collect();
    let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
    let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let avg = prices.iter().sum::<f64>() / prices.len() as f64;

    let daily = daily_closes(&entries);

    let mut moving_averages = BTreeMap::new();
    let mut percent_changes = BTreeMap::new();
    for &window in windows {
        if let Some(ma) = moving_average(&daily, window) {
            moving_averages.insert(window, ma);
        }
        if let Some(pc) = percent_change(&daily, window) {
            percent_changes.insert(window, pc);
        }
    }

    AggregatedMetrics {
        most_recent_price: entries.last().map(|e| e.price),
        min_price: Some(min),
        max_price: Some(max),
        avg_price: Some(avg),
        moving_averages,
        percent_changes,
        volatility: volatility(&daily),
    }
}

/// Collapse a chronologically sorted timeline into one closing price per
/// calendar day. The last entry of a day wins.
pub fn daily_closes(entries: &[&TimelineEntry]) -> Vec<(NaiveDate, f64)> {
    let mut daily: Vec<(NaiveDate, f64)> = Vec::new();
    for entry in entries {
        let date = entry.observed_at.date_naive();
        match daily.last_mut() {
            Some((last_date, price)) if *last_date == date => *price = entry.price,
            _ => daily.push((date, entry.price)),
        }
    }
    daily
}

/// Average of the most recent `window` distinct daily prices. With fewer
/// days of history than the window, averages whatever exists: graceful
/// degradation, not an error.
pub fn moving_average(daily: &[(NaiveDate, f64)], window: u32) -> Option<f64> {
    if daily.is_empty() || window == 0 {
        return None;
    }
    let take = daily.len().min(window as usize);
    let recent = &daily[daily.len() - take..];
    Some(recent.iter().map(|(_, p)| p).sum::<f64>() / take as f64)
}

/// Percent change between the latest daily price and the one `window`
/// distinct days back. Requires `window + 1` data points; anything less
/// yields an explicitly absent value, never a fabricated number.
pub fn percent_change(daily: &[(NaiveDate, f64)], window: u32) -> Option<f64> {
    if window == 0 || daily.len() < window as usize + 1 {
        return None;
    }
    let current = daily[daily.len() - 1].1;
    let past = daily[daily.len() - 1 - window as usize].1;
    if past <= 0.0 {
        return None;
    }
    Some((current - past) / past * 100.0)
}

/// Mean absolute day-over-day percent change. Needs at least two days.
pub fn volatility(daily: &[(NaiveDate, f64)]) -> Option<f64> {
    if daily.len() < 2 {
        return None;
    }
    let changes: Vec<f64> = daily
        .windows(2)
        .filter(|pair| pair[0].1 > 0.0)
        .map(|pair| ((pair[1].1 - pair[0].1) / pair[0].1 * 100.0).abs())
        .collect();
    if changes.is_empty() {
        return None;
    }
    Some(changes.iter().sum::<f64>() / changes.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use homepulse_common::ChangeType;

    fn entry(day: u32, hour: u32, price: f64) -> TimelineEntry {
        TimelineEntry {
            observed_at: Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap(),
            price,
            change_type: ChangeType::Initial,
            source: "test".into(),
            context: serde_json::Value::Null,
        }
    }

    #[test]
    fn empty_timeline_yields_defaults() {
        let m = recompute(&[], &DEFAULT_WINDOWS);
        assert_eq!(m, AggregatedMetrics::default());
    }

    #[test]
    fn simple_statistics() {
        let timeline = vec![entry(1, 9, 100.0), entry(2, 9, 300.0), entry(3, 9, 200.0)];
        let m = recompute(&timeline, &DEFAULT_WINDOWS);
        assert_eq!(m.most_recent_price, Some(200.0));
        assert_eq!(m.min_price, Some(100.0));
        assert_eq!(m.max_price, Some(300.0));
        assert_eq!(m.avg_price, Some(200.0));
    }

    #[test]
    fn moving_average_degrades_gracefully() {
        // 3 days of history, 7-day window: average over the 3 available days.
        let timeline = vec![entry(1, 9, 100.0), entry(2, 9, 200.0), entry(3, 9, 300.0)];
        let m = recompute(&timeline, &[7]);
        assert_eq!(m.moving_averages.get(&7), Some(&200.0));
    }

    #[test]
    fn percent_change_absent_under_short_history() {
        // 2 days of history cannot answer a 7-day change question.
        let timeline = vec![entry(1, 9, 100.0), entry(2, 9, 110.0)];
        let m = recompute(&timeline, &[7]);
        assert!(m.percent_changes.get(&7).is_none());
        // But a 1-day change is answerable.
        let m = recompute(&timeline, &[1]);
        assert_eq!(m.percent_changes.get(&1), Some(&10.0));
    }

    #[test]
    fn same_day_entries_collapse_to_last_write() {
        let timeline = vec![entry(1, 9, 100.0), entry(1, 15, 120.0), entry(2, 9, 130.0)];
        let entries: Vec<&TimelineEntry> = timeline.iter().collect();
        let daily = daily_closes(&entries);
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].1, 120.0);
    }

    #[test]
    fn insertion_order_does_not_matter() {
        // Late batch appended at the tail with an older timestamp.
        let in_order = vec![entry(1, 9, 100.0), entry(2, 9, 200.0), entry(3, 9, 300.0)];
        let late_tail = vec![entry(2, 9, 200.0), entry(3, 9, 300.0), entry(1, 9, 100.0)];
        assert_eq!(
            recompute(&in_order, &DEFAULT_WINDOWS),
            recompute(&late_tail, &DEFAULT_WINDOWS)
        );
    }

    #[test]
    fn volatility_needs_two_days() {
        let one = vec![entry(1, 9, 100.0)];
        assert_eq!(recompute(&one, &[7]).volatility, None);

        let two = vec![entry(1, 9, 100.0), entry(2, 9, 110.0)];
        let v = recompute(&two, &[7]).volatility.unwrap();
        assert!((v - 10.0).abs() < 1e-9);
    }
}
