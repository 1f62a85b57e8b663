//! Subscription billing engine.

mod engine;

pub use engine::{BillingEngine, BillingRunSummary, BillingStores};
