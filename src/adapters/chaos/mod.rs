//! Fault-injection coordinator.

mod coordinator;

pub use coordinator::{ChaosCoordinator, PaymentOutcome, SimulationMode};
