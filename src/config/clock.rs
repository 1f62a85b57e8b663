//! Clock configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Simulated clock configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClockConfig {
    /// Clock mode: `real`, `accelerated` or `manual`
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Acceleration multiplier, only meaningful in `accelerated` mode
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_mode() -> String {
    "real".to_string()
}

fn default_multiplier() -> f64 {
    1.0
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            multiplier: default_multiplier(),
        }
    }
}

impl ClockConfig {
    /// Validate clock configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.mode.as_str() {
            "real" | "accelerated" | "manual" => {}
            other => return Err(ValidationError::UnknownClockMode(other.to_string())),
        }
        if !self.multiplier.is_finite() || self.multiplier <= 0.0 {
            return Err(ValidationError::InvalidMultiplier);
        }
        Ok(())
    }
}
