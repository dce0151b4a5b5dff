//! JSON batch files — the hand-off format from upstream extraction.
//!
//! A batch is one JSON document with `observations` and `archived_parents`
//! arrays. Either may be omitted.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use homepulse_common::{Observation, ParentArchived};

use crate::traits::StaticSource;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ObservationBatch {
    #[serde(default)]
    pub observations: Vec<Observation>,
    #[serde(default)]
    pub archived_parents: Vec<ParentArchived>,
}

impl ObservationBatch {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read batch file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Malformed batch file {}", path.display()))
    }

    pub fn into_source(self) -> StaticSource {
        StaticSource {
            observations: self.observations,
            archived_parents: self.archived_parents,
        }
    }
}
