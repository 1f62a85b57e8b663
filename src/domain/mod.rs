//! Domain layer: pure types and rules for the billing simulator.
//!
//! No I/O lives here. Records are plain data with the invariants the
//! kernel components (adapters) enforce.

pub mod billing;
pub mod chaos;
pub mod foundation;
pub mod webhook;
