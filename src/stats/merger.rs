use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{BucketStore, PeriodDelta, StatsError};

/// Folds period deltas into the bucket store, retrying lost races
pub struct AggregateMerger {
    store: Arc<dyn BucketStore>,
    max_retries: u32,
    backoff: Duration,
}

impl AggregateMerger {
    pub fn new(store: Arc<dyn BucketStore>) -> Self {
        Self {
            store,
            max_retries: 3,
            backoff: Duration::from_millis(100),
        }
    }

    /// Set the maximum number of retries after a store conflict
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base delay; attempt `n` waits `backoff * 2^n`
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn store(&self) -> &Arc<dyn BucketStore> {
        &self.store
    }

    pub async fn merge(&self, tournament_id: &str, delta: &PeriodDelta) -> Result<(), StatsError> {
        if delta.deltas.is_empty() {
            debug!(tournament_id, period = %delta.period, "Nothing to merge");
            return Ok(());
        }

        let mut attempt: u32 = 0;
        loop {
            let result = self
                .store
                .merge_deltas(
                    tournament_id,
                    &delta.period,
                    &delta.deltas,
                    delta.clamp_to_zero,
                )
                .await;

            match result {
                Ok(()) => {
                    if attempt > 0 {
                        info!(
                            tournament_id,
                            period = %delta.period,
                            attempt = attempt + 1,
                            "Bucket merge succeeded after retry"
                        );
                    }
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    warn!(
                        tournament_id,
                        period = %delta.period,
                        attempt = attempt + 1,
                        error = %e,
                        "Bucket merge conflicted, will retry"
                    );
                    tokio::time::sleep(self.delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        tournament_id,
                        period = %delta.period,
                        attempt = attempt + 1,
                        error = %e,
                        "Bucket merge failed"
                    );
                    return Err(e);
                }
            }
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(2_u32.saturating_pow(attempt.min(10)))
    }
}
