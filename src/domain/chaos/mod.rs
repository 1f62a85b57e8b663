//! Chaos configuration tree and per-namespace statistics.

mod config;
mod stats;

pub use config::{
    ApiChaos, ApiChaosPatch, ApiOutcome, ChaosConfig, ChaosPatch, EventChaos, EventChaosPatch,
    ForcedApiFailure, PaymentChaos, PaymentChaosPatch,
};
pub use stats::ChaosStats;
