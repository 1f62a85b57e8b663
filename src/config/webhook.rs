//! Webhook delivery configuration

use std::time::Duration;

use serde::Deserialize;

use super::error::ValidationError;

/// Outbound webhook delivery configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Per-request timeout on outbound POSTs, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Deliver synchronously instead of on a background task.
    /// Test harnesses set this to assert on delivery outcomes.
    #[serde(default)]
    pub synchronous: bool,
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            synchronous: false,
        }
    }
}

impl WebhookConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate webhook configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.request_timeout_secs == 0 || self.request_timeout_secs > 300 {
            return Err(ValidationError::InvalidRequestTimeout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = WebhookConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(!config.synchronous);
    }

    #[test]
    fn out_of_range_timeout_is_rejected() {
        for secs in [0, 301] {
            let config = WebhookConfig {
                request_timeout_secs: secs,
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ValidationError::InvalidRequestTimeout)
            ));
        }
    }
}
