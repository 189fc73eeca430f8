//! Bounded retry for the push request.

use std::future::Future;
use std::time::Duration;

use crate::transport::{TransportError, TransportResponse};

/// Delays slept between attempts; one retry per delay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4),
        ])
    }
}

impl RetryPolicy {
    pub const fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    pub fn max_attempts(&self) -> usize {
        self.delays.len() + 1
    }
}

/// Send with retries.
///
/// Transport errors and 5xx answers are retried after the next delay. Any
/// other response, including 4xx, is returned at once. `None` means every
/// attempt failed.
pub async fn send_with_retry<F, Fut>(policy: &RetryPolicy, mut send: F) -> Option<TransportResponse>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<TransportResponse, TransportError>>,
{
    let mut delays = policy.delays().iter();
    let mut attempt = 1usize;

    loop {
        let failure = match send().await {
            Ok(response) if !response.is_server_error() => return Some(response),
            Ok(response) => format!("HTTP {}", response.status),
            Err(error) => error.to_string(),
        };

        let Some(delay) = delays.next() else {
            tracing::warn!(attempt, "Push attempts exhausted: {failure}");
            return None;
        };
        tracing::debug!(
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Transient push failure, retrying: {failure}"
        );
        tokio::time::sleep(*delay).await;
        attempt += 1;
    }
}
