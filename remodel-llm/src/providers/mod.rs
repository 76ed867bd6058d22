//! Completion provider implementations
//!
//! Concrete [`crate::CompletionProvider`] implementations over HTTP.

pub mod anthropic;
pub mod openai;

pub use anthropic::{AnthropicClient, AnthropicCompletionProvider};
pub use openai::{OpenAIClient, OpenAICompletionProvider};

use remodel_core::{LlmError, RemodelError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, SemaphorePermit};

pub(crate) fn request_failed(provider: &str, status: u16, message: impl Into<String>) -> RemodelError {
    RemodelError::Llm(LlmError::RequestFailed {
        provider: provider.to_string(),
        status,
        message: message.into(),
    })
}

pub(crate) fn rate_limited(provider: &str, retry_after_ms: u64) -> RemodelError {
    RemodelError::Llm(LlmError::RateLimited {
        provider: provider.to_string(),
        retry_after_ms,
    })
}

pub(crate) fn invalid_response(provider: &str, reason: impl Into<String>) -> RemodelError {
    RemodelError::Llm(LlmError::InvalidResponse {
        provider: provider.to_string(),
        reason: reason.into(),
    })
}

/// Parse a `Retry-After` header given in (possibly fractional) seconds.
pub(crate) fn parse_retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
        .map(|seconds| (seconds * 1000.0) as u64)
}

/// Concurrency cap plus minimum spacing between request starts.
#[derive(Debug)]
pub(crate) struct RequestPacer {
    permits: Semaphore,
    last_request_ms: AtomicU64,
    min_interval_ms: u64,
    start: Instant,
}

impl RequestPacer {
    pub(crate) fn new(requests_per_minute: u32) -> Self {
        let rpm = requests_per_minute.max(1);
        Self {
            permits: Semaphore::new(rpm as usize),
            last_request_ms: AtomicU64::new(0),
            min_interval_ms: (60_000 / u64::from(rpm)).max(10),
            start: Instant::now(),
        }
    }

    /// Wait for a permit and for the minimum interval to pass.
    pub(crate) async fn acquire(&self, provider: &str) -> Result<SemaphorePermit<'_>, RemodelError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| request_failed(provider, 0, format!("Rate limiter error: {}", e)))?;

        // Zero means no request has been sent yet.
        let last_ms = self.last_request_ms.load(Ordering::Relaxed);
        if last_ms != 0 {
            let since_last = (self.start.elapsed().as_millis() as u64).saturating_sub(last_ms);
            if since_last < self.min_interval_ms {
                tokio::time::sleep(Duration::from_millis(self.min_interval_ms - since_last)).await;
            }
        }
        self.last_request_ms
            .store((self.start.elapsed().as_millis() as u64).max(1), Ordering::Relaxed);

        Ok(permit)
    }
}
