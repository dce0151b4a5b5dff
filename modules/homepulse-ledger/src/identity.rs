//! Content-addressed identity for entities and regions.
//!
//! Ids are derived from semi-stable natural keys, not URLs, so re-scrapes
//! that shuffle surface identifiers still land on the same ledger.

use sha2::{Digest, Sha256};

use homepulse_common::Location;

use crate::error::{LedgerError, Result};

/// Derive the stable entity id from a natural key (the detail-page address).
/// Deterministic and pure; rejects keys that normalize to nothing.
pub fn entity_id(natural_key: &str) -> Result<String> {
    let normalized = normalize(natural_key);
    if normalized.is_empty() {
        return Err(LedgerError::InvalidKey(natural_key.to_string()));
    }
    Ok(digest(&normalized))
}

/// Derive the rollup id for a geography tuple.
pub fn region_id(location: &Location) -> String {
    let key = format!(
        "{}|{}|{}",
        normalize(&location.locality),
        normalize(&location.county),
        normalize(&location.region)
    );
    digest(&key)
}

/// Lowercase, trim, and collapse internal whitespace so cosmetic upstream
/// variations map to one identity.
fn normalize(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

fn digest(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_same_id() {
        let a = entity_id("123 Alder Way, Temecula").unwrap();
        let b = entity_id("123 Alder Way, Temecula").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn cosmetic_variations_collapse() {
        let a = entity_id("123 Alder Way,  Temecula").unwrap();
        let b = entity_id("  123 ALDER way, temecula ").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_keys_differ() {
        let a = entity_id("123 Alder Way").unwrap();
        let b = entity_id("124 Alder Way").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn empty_key_rejected() {
        assert!(entity_id("").is_err());
        assert!(entity_id("   ").is_err());
    }

    #[test]
    fn region_id_ignores_case() {
        let a = region_id(&Location {
            locality: "Temecula".into(),
            county: "Riverside".into(),
            region: "CA".into(),
        });
        let b = region_id(&Location {
            locality: "temecula".into(),
            county: "RIVERSIDE".into(),
            region: "ca".into(),
        });
        assert_eq!(a, b);
    }
}
