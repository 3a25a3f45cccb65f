use crate::error::ProviderError;
use crate::models::{PipelineOptions, RetryPolicy};
use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::warn;

/// Bounded wait plus optional retry around a single provider call.
#[derive(Debug, Clone, Copy)]
pub struct ProviderGuard {
    timeout: Duration,
    retry: RetryPolicy,
}

impl ProviderGuard {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Self {
        Self { timeout, retry }
    }

    /// Runs `operation` until it succeeds, fails permanently, or the retry
    /// budget is spent. Each attempt is cut off after the configured timeout.
    pub async fn call<T, F, Fut>(&self, backend: &str, mut operation: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let timeout = self.timeout;
        let base_ms = (self.retry.base_delay.as_millis() as u64 / 2).max(1);
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(base_ms)
            .max_delay(self.retry.max_delay)
            .map(jitter)
            .take(self.retry.max_attempts.saturating_sub(1));

        let attempt = || {
            let pending = operation();
            async move {
                match tokio::time::timeout(timeout, pending).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout {
                        backend: backend.to_string(),
                        millis: timeout.as_millis() as u64,
                    }),
                }
            }
        };

        let should_retry = |error: &ProviderError| {
            let transient = error.is_transient();
            if transient {
                warn!(backend, error = %error, "transient provider failure");
            }
            transient
        };

        RetryIf::start(strategy, attempt, should_retry).await
    }
}

impl From<&PipelineOptions> for ProviderGuard {
    fn from(value: &PipelineOptions) -> Self {
        Self::new(value.provider_timeout, value.retry)
    }
}
