use std::future::Future;
use std::time::Duration;

use tracing::debug;

use super::StoreError;

/// Bounded exponential backoff for optimistic-concurrency conflicts.
#[derive(Clone, Copy, Debug)]
pub struct ConflictRetry {
    pub steps: u32,
    pub base: Duration,
    pub factor: f64,
}

impl Default for ConflictRetry {
    fn default() -> Self {
        Self {
            steps: 5,
            base: Duration::from_millis(10),
            factor: 2.0,
        }
    }
}

/// Runs `op` until it succeeds, fails with a non-conflict error, or the
/// retry budget is exhausted (in which case the final conflict error is
/// returned). Each attempt must re-read the object it mutates.
pub async fn retry_on_conflict<T, F, Fut>(
    policy: ConflictRetry,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut delay = policy.base;
    let mut attempt = 0u32;
    loop {
        match op().await {
            Err(StoreError::Conflict(what)) if attempt + 1 < policy.steps => {
                attempt += 1;
                debug!(%what, attempt, "conflict, backing off and retrying");
                tokio::time::sleep(delay).await;
                delay = delay.mul_f64(policy.factor);
            }
            other => return other,
        }
    }
}
