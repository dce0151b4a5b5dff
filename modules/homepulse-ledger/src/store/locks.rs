use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-entity mutual exclusion, keyed by entity id.
///
/// Append, metric recompute, and archive relocation for one entity never
/// interleave; unrelated entities proceed in parallel.
#[derive(Default)]
pub struct EntityLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, entity_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut registry = self.inner.lock().await;
            registry.entry(entity_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}
