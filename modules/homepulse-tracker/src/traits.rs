// Trait abstraction over upstream extraction.
//
// The tracker never fetches or parses pages itself; it consumes normalized
// observations and parent-archived events from whatever produced them.
// StaticSource feeds a fixed batch — file replay in production, fixtures in
// tests: no network, no scraper.

use anyhow::Result;
use async_trait::async_trait;

use homepulse_common::{Observation, ParentArchived};

#[async_trait]
pub trait ObservationSource: Send + Sync {
    /// Normalized entity observations from the latest extraction.
    async fn observations(&self) -> Result<Vec<Observation>>;

    /// Parents upstream marked as no longer available since the last run.
    async fn archived_parents(&self) -> Result<Vec<ParentArchived>>;
}

/// A fixed, already-materialized batch.
#[derive(Debug, Default)]
pub struct StaticSource {
    pub observations: Vec<Observation>,
    pub archived_parents: Vec<ParentArchived>,
}

#[async_trait]
impl ObservationSource for StaticSource {
    async fn observations(&self) -> Result<Vec<Observation>> {
        Ok(self.observations.clone())
    }

    async fn archived_parents(&self) -> Result<Vec<ParentArchived>> {
        Ok(self.archived_parents.clone())
    }
}
