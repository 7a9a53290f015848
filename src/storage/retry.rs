//! Conflict retry configuration for the slip-number allocator.

use std::time::Duration;

use backon::ExponentialBuilder;

/// Backoff applied when a counter compare-and-swap loses a race.
///
/// Only conflicts are retried. Store failures surface on the first attempt.
#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: usize,
    /// Initial delay between retries in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            max_retries: 16,
            initial_delay_ms: 1,
            max_delay_ms: 50,
        }
    }
}

impl AllocatorConfig {
    /// Creates an AllocatorConfig from environment variables.
    ///
    /// Environment variables:
    /// - `BORDEREAU_ALLOC_MAX_RETRIES`: Maximum conflict retries (default: 16)
    /// - `BORDEREAU_ALLOC_RETRY_MIN_MS`: Initial backoff delay in ms (default: 1)
    /// - `BORDEREAU_ALLOC_RETRY_MAX_MS`: Maximum backoff delay in ms (default: 50)
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_retries: std::env::var("BORDEREAU_ALLOC_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_retries),
            initial_delay_ms: std::env::var("BORDEREAU_ALLOC_RETRY_MIN_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.initial_delay_ms),
            max_delay_ms: std::env::var("BORDEREAU_ALLOC_RETRY_MAX_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_delay_ms),
        }
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> usize {
        self.max_retries + 1
    }

    /// Creates an exponential backoff builder with jitter.
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_max_times(self.max_retries)
            .with_jitter()
    }
}
