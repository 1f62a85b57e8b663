//! Time source consumed by every time-sensitive component.

/// Pluggable clock.
///
/// `now` is called far more often than the clock is mutated (every
/// billing poll, every idempotency TTL check), so implementations must
/// keep it lock-free.
pub trait Clock: Send + Sync {
    /// Current simulated time in unix seconds.
    fn now(&self) -> i64;
}
