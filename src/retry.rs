use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::GatewayError;

/// Bounded exponential backoff for calls across the persistence boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter_max: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            jitter_max: Some(Duration::from_millis(250)),
        }
    }
}

impl RetryConfig {
    pub fn for_submission() -> Self {
        Self {
            max_attempts: 6,
            base_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
            jitter_max: Some(Duration::from_millis(500)),
        }
    }

    /// Delay before the retry that follows failed attempt number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let base = self.base_backoff.saturating_mul(1u32 << shift);
        let backoff = base.min(self.max_backoff);
        match self.jitter_max {
            Some(jitter) if !jitter.is_zero() => {
                let jitter_ms = jitter.as_millis() as u64;
                backoff + Duration::from_millis(rand::random::<u64>() % (jitter_ms + 1))
            }
            _ => backoff,
        }
    }
}

/// On-disk form of [`RetryConfig`], in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub jitter_ms: u64,
}

impl From<&RetrySettings> for RetryConfig {
    fn from(s: &RetrySettings) -> Self {
        Self {
            max_attempts: s.max_attempts.max(1),
            base_backoff: Duration::from_millis(s.base_backoff_ms),
            max_backoff: Duration::from_millis(s.max_backoff_ms.max(s.base_backoff_ms)),
            jitter_max: (s.jitter_ms > 0).then(|| Duration::from_millis(s.jitter_ms)),
        }
    }
}

impl From<&RetryConfig> for RetrySettings {
    fn from(c: &RetryConfig) -> Self {
        Self {
            max_attempts: c.max_attempts,
            base_backoff_ms: c.base_backoff.as_millis() as u64,
            max_backoff_ms: c.max_backoff.as_millis() as u64,
            jitter_ms: c.jitter_max.map(|j| j.as_millis() as u64).unwrap_or(0),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        (&RetryConfig::default()).into()
    }
}

/// Runs `f` until it succeeds, fails with a non-transient error, or the
/// attempt budget is spent. Only [`GatewayError::Transient`] is retried.
pub async fn retry_transient<F, Fut, T>(
    config: &RetryConfig,
    operation: &str,
    mut f: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < config.max_attempts => {
                let wait = config.backoff_for(attempt);
                warn!(
                    operation,
                    attempt,
                    wait_ms = wait.as_millis() as u64,
                    error = %e,
                    "transient failure, retrying"
                );
                tokio::time::sleep(wait).await;
            }
            Err(e) => return Err(e),
        }
    }
}
