use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use quill_core::context::GenerationContext;
use quill_core::errors::GatewayError;
use quill_core::provider::{ChunkStream, CognitiveProvider};

#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Retries the `generate` call on transient errors with exponential backoff.
///
/// Only the call that opens the stream is retried. Once chunks flow, a
/// mid-stream failure is returned to the caller as-is.
pub struct RetryingProvider<P> {
    inner: P,
    config: RetryConfig,
    total_retries: AtomicU64,
}

impl<P: CognitiveProvider> RetryingProvider<P> {
    pub fn new(inner: P, config: RetryConfig) -> Self {
        Self {
            inner,
            config,
            total_retries: AtomicU64::new(0),
        }
    }

    pub fn with_defaults(inner: P) -> Self {
        Self::new(inner, RetryConfig::default())
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn total_retries(&self) -> u64 {
        self.total_retries.load(Ordering::Relaxed)
    }

    /// Server hint if present, else `base * 2^attempt` capped at `max_delay`.
    fn retry_delay(&self, attempt: u32, suggested: Option<Duration>) -> Duration {
        if let Some(delay) = suggested {
            return delay.min(self.config.max_delay);
        }
        self.config
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.config.max_delay)
    }
}

#[async_trait]
impl<P: CognitiveProvider> CognitiveProvider for RetryingProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, context: &GenerationContext) -> Result<ChunkStream, GatewayError> {
        let mut attempt = 0;
        loop {
            match self.inner.generate(context).await {
                Ok(stream) => return Ok(stream),
                Err(e) if !e.is_retryable() || attempt >= self.config.max_retries => return Err(e),
                Err(e) => {
                    let delay = self.retry_delay(attempt, e.suggested_delay());
                    self.total_retries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error_kind = e.error_kind(),
                        error = %e,
                        "retrying generation"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
