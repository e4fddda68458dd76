//! # Retry Policy
//!
//! An explicit policy object composed around a [`RequestExecutor`]. Retries
//! are triggered only by transport-level failures; a cleanly returned failed
//! outcome (e.g. a non-2xx status) is a definitive application-level answer
//! and is passed through untouched.

use crate::executor::{RequestDescriptor, RequestExecutor, RequestOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Bounded-attempt retry wrapper for an executor.
///
/// After the attempt ceiling is exhausted, the last transport error is
/// downgraded into a failed [`RequestOutcome`] so it participates in the
/// run's failure statistics instead of aborting the run.
#[derive(Clone)]
pub struct RetryPolicy {
    executor: Arc<dyn RequestExecutor>,
    max_attempts: usize,
    delay: Duration,
}

impl RetryPolicy {
    /// Wrap `executor` with a fixed attempt ceiling and inter-attempt delay.
    ///
    /// `max_attempts` counts the initial call, so a ceiling of 3 means at
    /// most two retries. A ceiling of 0 is clamped to 1.
    pub fn new(executor: Arc<dyn RequestExecutor>, max_attempts: usize, delay: Duration) -> Self {
        Self {
            executor,
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Execute a request, retrying transport failures up to the ceiling.
    ///
    /// Always resolves to an outcome; exhausted attempts synthesize a failed
    /// one carrying the attempt count and the last error.
    pub async fn execute(&self, descriptor: &RequestDescriptor) -> RequestOutcome {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            match self.executor.execute(descriptor).await {
                Ok(outcome) => return outcome,
                Err(err) => {
                    warn!(
                        "transport failure on attempt {}/{}: {}",
                        attempt, self.max_attempts, err
                    );
                    last_error = Some(err);
                    if attempt < self.max_attempts {
                        sleep(self.delay).await;
                    }
                }
            }
        }

        let last = last_error
            .map(|err| err.to_string())
            .unwrap_or_else(|| "unknown transport failure".to_string());
        RequestOutcome::failure(
            descriptor.prompt_len,
            format!("failed after {} attempts: {}", self.max_attempts, last),
        )
    }
}
