//! Centralized Configuration Management
//!
//! Consolidates the configuration structures used throughout the sync engine.
//! Retry counts, backoff delays, and reconciliation windows are policy knobs,
//! so all of them live here rather than in the code that applies them.

use core::time::Duration;

// ----------------------------------------------------------------------------
// Transport Configuration
// ----------------------------------------------------------------------------

/// Configuration for the backend HTTP adapter.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TransportConfig {
    /// Base URL of the local backend service.
    pub base_url: String,
    /// Per-request timeout. Each retry attempt gets a fresh budget.
    pub request_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }
}

// ----------------------------------------------------------------------------
// Retry Configuration
// ----------------------------------------------------------------------------

/// Configuration for retrying transient transport failures.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RetryConfig {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Exponential backoff multiplier.
    pub backoff_multiplier: f32,
    /// Upper bound on any single backoff delay.
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Backoff delay before retry attempt `attempt` (1-based: attempt 1 is
    /// the delay after the first failure).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff.as_millis() as f32;
        let exponent = attempt.saturating_sub(1) as i32;
        let delay_ms = (base * self.backoff_multiplier.powi(exponent)) as u64;
        Duration::from_millis(delay_ms).min(self.max_backoff)
    }
}

// ----------------------------------------------------------------------------
// Sync Configuration
// ----------------------------------------------------------------------------

/// Configuration for cache reconciliation and background refresh.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SyncConfig {
    /// History page size requested per fetch.
    pub page_size: usize,
    /// Tolerance window for matching an optimistic message against a
    /// backend-reported one.
    pub confirm_window: Duration,
    /// How long an optimistic message may stay pending before it is marked
    /// failed.
    pub confirm_deadline: Duration,
    /// Interval between background refresh ticks (friend list, active
    /// conversation, availability probe).
    pub refresh_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            confirm_window: Duration::from_secs(5),
            confirm_deadline: Duration::from_secs(30),
            refresh_interval: Duration::from_secs(15),
        }
    }
}

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes for the engine's channels.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChannelConfig {
    /// Buffer size for intents (UI → engine).
    pub intent_buffer_size: usize,
    /// Buffer size for task outcomes (workers → engine).
    pub outcome_buffer_size: usize,
    /// Buffer size for notifications (engine → UI).
    pub notification_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            intent_buffer_size: 32,        // UI intents are infrequent
            outcome_buffer_size: 128,      // network completions can be bursty
            notification_buffer_size: 64,  // UI updates need responsiveness
        }
    }
}

// ----------------------------------------------------------------------------
// Master Configuration
// ----------------------------------------------------------------------------

/// Master configuration for the sync engine.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct EngineConfig {
    pub transport: TransportConfig,
    pub retry: RetryConfig,
    pub sync: SyncConfig,
    pub channels: ChannelConfig,
}

impl EngineConfig {
    /// Create new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration with fast retries and tiny windows for tests.
    pub fn testing() -> Self {
        Self {
            transport: TransportConfig {
                base_url: "http://127.0.0.1:8080".to_string(),
                request_timeout: Duration::from_millis(250),
            },
            retry: RetryConfig {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(5),
                backoff_multiplier: 2.0,
                max_backoff: Duration::from_millis(50),
            },
            sync: SyncConfig {
                page_size: 10,
                confirm_window: Duration::from_millis(250),
                confirm_deadline: Duration::from_secs(1),
                refresh_interval: Duration::from_secs(3600),
            },
            channels: ChannelConfig {
                intent_buffer_size: 16,
                outcome_buffer_size: 64,
                notification_buffer_size: 64,
            },
        }
    }

    /// Builder method for customizing the transport configuration
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// Builder method for customizing the retry configuration
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Builder method for customizing the sync configuration
    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    /// Builder method for customizing channel buffer sizes
    pub fn with_channels(mut self, channels: ChannelConfig) -> Self {
        self.channels = channels;
        self
    }

    /// Validate the configuration for consistency and feasibility
    pub fn validate(&self) -> Result<(), String> {
        if self.transport.base_url.is_empty() {
            return Err("Backend base URL cannot be empty".into());
        }
        if self.transport.request_timeout.is_zero() {
            return Err("Request timeout cannot be zero".into());
        }

        if self.retry.max_attempts == 0 {
            return Err("Max attempts cannot be zero".into());
        }
        if self.retry.backoff_multiplier <= 1.0 {
            return Err("Backoff multiplier must be greater than 1.0".into());
        }
        if self.retry.initial_backoff > self.retry.max_backoff {
            return Err("Initial backoff cannot be greater than max backoff".into());
        }

        if self.sync.page_size == 0 {
            return Err("History page size cannot be zero".into());
        }
        if self.sync.confirm_deadline < self.sync.confirm_window {
            return Err("Confirmation deadline cannot be shorter than the match window".into());
        }

        if self.channels.intent_buffer_size == 0 {
            return Err("Intent buffer size cannot be zero".into());
        }
        if self.channels.outcome_buffer_size == 0 {
            return Err("Outcome buffer size cannot be zero".into());
        }
        if self.channels.notification_buffer_size == 0 {
            return Err("Notification buffer size cannot be zero".into());
        }

        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validation() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_testing_config_validation() {
        let config = EngineConfig::testing();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config_validation() {
        let mut config = EngineConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.channels.intent_buffer_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_exponential_backoff_schedule() {
        let retry = RetryConfig {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(30),
        };

        assert_eq!(retry.backoff_for_attempt(1), Duration::from_millis(500));
        assert_eq!(retry.backoff_for_attempt(2), Duration::from_millis(1000));
        assert_eq!(retry.backoff_for_attempt(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_backoff_is_capped() {
        let retry = RetryConfig {
            max_attempts: 10,
            initial_backoff: Duration::from_secs(10),
            backoff_multiplier: 3.0,
            max_backoff: Duration::from_secs(30),
        };

        assert_eq!(retry.backoff_for_attempt(4), Duration::from_secs(30));
    }

    #[test]
    fn test_config_builder_pattern() {
        let config = EngineConfig::new()
            .with_retry(RetryConfig {
                max_attempts: 5,
                ..RetryConfig::default()
            })
            .with_sync(SyncConfig {
                page_size: 25,
                ..SyncConfig::default()
            });

        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.sync.page_size, 25);
    }
}
