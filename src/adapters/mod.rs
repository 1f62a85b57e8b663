//! Kernel components implementing the port contracts.

pub mod billing;
pub mod chaos;
pub mod clock;
pub mod events;
pub mod store;
pub mod webhook;
