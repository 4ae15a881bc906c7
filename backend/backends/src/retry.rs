//! Retry decorator for model backends.
//!
//! Wraps any backend and retries retryable failures with exponential backoff.
//! The orchestrator sees one atomic outcome per `send`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use forgeloop_core::{BackendError, ModelBackend, ModelRequest, ModelResponse};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    #[serde(with = "millis")]
    pub initial_backoff: Duration,
    #[serde(with = "millis")]
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(retry.saturating_sub(1) as i32);
        let delay = self.initial_backoff.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_backoff.as_secs_f64()))
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

pub struct RetryingBackend {
    inner: Arc<dyn ModelBackend>,
    policy: RetryPolicy,
}

impl RetryingBackend {
    pub fn new(inner: Arc<dyn ModelBackend>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl ModelBackend for RetryingBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn send(&self, request: &ModelRequest) -> Result<ModelResponse, BackendError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.inner.send(request).await {
                Ok(response) => {
                    if attempt > 1 {
                        info!(backend = self.inner.name(), attempt, "Backend recovered after retry");
                    }
                    return Ok(response);
                }
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) if attempt >= max_attempts => {
                    warn!(backend = self.inner.name(), attempts = attempt, error = %err, "Retries exhausted");
                    return Err(BackendError::RetriesExhausted {
                        attempts: attempt,
                        last: err.to_string(),
                    });
                }
                Err(err) => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        backend = self.inner.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retryable backend error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
