use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::core::error::Result;

const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts allowed; `None` keeps retrying transient failures
    pub max_attempts: Option<u32>,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Double the delay after every failed attempt (capped at 60s)
    pub exponential_backoff: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(5),
            base_delay: Duration::from_millis(500),
            exponential_backoff: true,
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
            ..Self::default()
        }
    }
}

/// Re-runs `operation` while it fails with a transient error. Any other error
/// is returned at once, as is the last transient error when the attempts run
/// out.
pub async fn retry_transient<F, Fut, T>(
    label: &str,
    mut operation: F,
    config: RetryConfig,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    let mut delay = config.base_delay;

    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    info!("✅ {label} succeeded on attempt {attempt}");
                }
                return Ok(result);
            }
            Err(e) if !e.is_transient() => {
                error!("❌ {label} failed permanently: {e}");
                return Err(e);
            }
            Err(e) => {
                warn!("⚠️ {label} attempt {attempt} failed: {e}");

                if let Some(max) = config.max_attempts
                    && attempt >= max
                {
                    error!("🚫 {label}: giving up after {max} attempts");
                    return Err(e);
                }

                info!("⏳ Waiting {:?} before retrying {label}", delay);
                sleep(delay).await;

                if config.exponential_backoff {
                    delay = std::cmp::min(delay * 2, MAX_BACKOFF);
                }
            }
        }
    }
}
