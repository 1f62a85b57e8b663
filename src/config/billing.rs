//! Billing engine configuration

use std::time::Duration;

use serde::Deserialize;

use super::error::ValidationError;

/// Billing scan loop configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Interval between subscription scans, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl BillingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate billing configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.poll_interval_ms == 0 {
            return Err(ValidationError::InvalidPollInterval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scans_every_second() {
        let config = BillingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = BillingConfig { poll_interval_ms: 0 };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidPollInterval)
        ));
    }
}
