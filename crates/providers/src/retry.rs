//! Exponential backoff around a decision service.

use async_trait::async_trait;
use browserpilot_core::{Decision, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::{DecisionRequest, DecisionService};

/// Retries transient failures (`Error::is_transient`) up to `max_retries`
/// times, waiting `base_delay * 2^(attempt-1)` before each retry. Permanent
/// failures return immediately.
pub struct RetryingDecisionService {
    inner: Arc<dyn DecisionService>,
    max_retries: u32,
    base_delay: Duration,
}

impl RetryingDecisionService {
    pub fn new(inner: Arc<dyn DecisionService>, max_retries: u32, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << (attempt - 1).min(4))
    }
}

#[async_trait]
impl DecisionService for RetryingDecisionService {
    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision> {
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let delay = self.delay_for(attempt);
                warn!(
                    attempt,
                    max_retries = self.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying decision service after transient error"
                );
                tokio::time::sleep(delay).await;
            }
            match self.inner.decide(request).await {
                Ok(decision) => {
                    if attempt > 0 {
                        info!(attempt, "Decision service succeeded after retry");
                    }
                    return Ok(decision);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    warn!(error = %e, attempt, max_retries = self.max_retries, "Decision service call failed");
                    attempt += 1;
                }
                Err(e) => {
                    warn!(error = %e, attempt, retries = self.max_retries, "Decision service call failed; giving up");
                    return Err(e);
                }
            }
        }
    }
}
