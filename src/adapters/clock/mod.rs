//! Simulator clock.

mod sim_clock;

pub use sim_clock::{ClockMode, SimClock};
