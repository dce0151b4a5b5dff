//! Snapshot comparator — decides whether a fresh observation warrants a new
//! timeline entry. This is what keeps the ledger proportional to actual
//! market activity rather than re-scrape frequency.

use homepulse_common::ChangeType;

/// Outcome of comparing a fresh observation against the last recorded price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotDecision {
    /// Append a new entry with this change type.
    Record(ChangeType),
    /// Price matches the last entry; idempotent no-op.
    Unchanged,
    /// No usable price in the observation; nothing to record.
    Skip,
}

/// Evaluate a fresh price against the most recent recorded one.
///
/// A missing or non-positive price is treated as "no observation"; it is
/// never recorded as a decrease to zero.
pub fn evaluate(last_price: Option<f64>, observed: Option<f64>) -> SnapshotDecision {
    let observed = match observed {
        Some(p) if p > 0.0 => p,
        _ => return SnapshotDecision::Skip,
    };

    let last = match last_price {
        Some(p) => p,
        None => return SnapshotDecision::Record(ChangeType::Initial),
    };

    // Prices come from the same upstream parser, so exact equality is the
    // unchanged test.
    if observed == last {
        SnapshotDecision::Unchanged
    } else if observed > last {
        SnapshotDecision::Record(ChangeType::Increase)
    } else {
        SnapshotDecision::Record(ChangeType::Decrease)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sighting_is_initial() {
        assert_eq!(
            evaluate(None, Some(450_000.0)),
            SnapshotDecision::Record(ChangeType::Initial)
        );
    }

    #[test]
    fn unchanged_price_is_noop() {
        assert_eq!(
            evaluate(Some(450_000.0), Some(450_000.0)),
            SnapshotDecision::Unchanged
        );
    }

    #[test]
    fn direction_follows_sign() {
        assert_eq!(
            evaluate(Some(450_000.0), Some(460_000.0)),
            SnapshotDecision::Record(ChangeType::Increase)
        );
        assert_eq!(
            evaluate(Some(450_000.0), Some(440_000.0)),
            SnapshotDecision::Record(ChangeType::Decrease)
        );
    }

    #[test]
    fn missing_or_zero_price_never_recorded() {
        assert_eq!(evaluate(Some(450_000.0), None), SnapshotDecision::Skip);
        assert_eq!(evaluate(Some(450_000.0), Some(0.0)), SnapshotDecision::Skip);
        assert_eq!(evaluate(None, Some(-5.0)), SnapshotDecision::Skip);
    }
}
