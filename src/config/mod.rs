//! Application configuration module
//!
//! Type-safe configuration loading from environment variables using the
//! `config` and `dotenvy` crates. Values are read with the `PAYSIM`
//! prefix and nested sections use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use paysim::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod billing;
mod clock;
mod error;
mod simulation;
mod webhook;

pub use billing::BillingConfig;
pub use clock::ClockConfig;
pub use error::{ConfigError, ValidationError};
pub use simulation::SimulationConfig;
pub use webhook::WebhookConfig;

use serde::Deserialize;

/// Root simulator configuration
///
/// Every section has working defaults, so a bare environment yields a
/// runnable simulator. Load using [`AppConfig::load()`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Clock configuration (mode, acceleration multiplier)
    #[serde(default)]
    pub clock: ClockConfig,

    /// Billing scan loop configuration
    #[serde(default)]
    pub billing: BillingConfig,

    /// Webhook delivery configuration
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Chaos-mode defaults
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// Loads a `.env` file if present, then reads variables with the
    /// `PAYSIM` prefix using `__` to separate nested values, e.g.
    /// `PAYSIM__CLOCK__MODE=accelerated` -> `clock.mode = accelerated`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into the
    /// expected types.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Environment::default().prefix("PAYSIM").separator("__"))
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.clock.validate()?;
        self.billing.validate()?;
        self.webhook.validate()?;
        self.simulation.validate()?;
        Ok(())
    }
}
