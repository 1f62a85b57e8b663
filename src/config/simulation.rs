//! Simulation defaults

use serde::Deserialize;

use super::error::ValidationError;

/// Defaults applied when a namespace is switched into chaos mode
/// without an explicit configuration patch.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    /// Payment failure rate used by `chaos` mode when none is given
    #[serde(default = "default_failure_rate")]
    pub default_failure_rate: f64,
}

fn default_failure_rate() -> f64 {
    0.5
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            default_failure_rate: default_failure_rate(),
        }
    }
}

impl SimulationConfig {
    /// Validate simulation configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.default_failure_rate.is_finite()
            || !(0.0..=1.0).contains(&self.default_failure_rate)
        {
            return Err(ValidationError::InvalidFailureRate);
        }
        Ok(())
    }
}
