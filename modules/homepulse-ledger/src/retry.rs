use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::Result;

/// Max attempts for an individual store write.
const MAX_ATTEMPTS: u32 = 3;
/// Base backoff duration. Actual delay is base * 3^attempt + jitter.
const RETRY_BASE: Duration = Duration::from_millis(200);

/// Retry a single-entity store write a bounded number of times. Exhaustion
/// surfaces the last error to the caller, which records the entity as
/// failed in the run summary rather than aborting the batch.
pub(crate) async fn with_retry<T, F, Fut>(what: &str, entity_id: &str, op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt + 1 < MAX_ATTEMPTS => {
                let backoff = RETRY_BASE * 3u32.pow(attempt);
                let jitter = Duration::from_millis(rand::rng().random_range(0..50));
                warn!(
                    entity_id,
                    what,
                    attempt = attempt + 1,
                    error = %e,
                    "Store write failed, retrying after backoff"
                );
                tokio::time::sleep(backoff + jitter).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
