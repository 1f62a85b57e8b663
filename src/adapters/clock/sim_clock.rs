//! Real / accelerated / manual time source.
//!
//! `now()` reads only atomics so hot callers (billing polls, TTL
//! checks) never contend. Mutations serialize through a mutex and
//! always re-anchor `started_at` at the current wall-clock instant,
//! folding previously observed time into `offset`, so the observed
//! timeline stays continuous across mode changes.

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;

use crate::ports::Clock;

/// How the clock derives `now()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMode {
    /// `now = wallclock()`.
    Real,
    /// Wall-clock elapsed time scaled by a multiplier.
    Accelerated,
    /// Frozen; only `advance` moves observed time.
    Manual,
}

impl ClockMode {
    /// Parse a mode string. Malformed input falls back to `Real`.
    pub fn parse(mode: &str) -> Self {
        match mode {
            "accelerated" => ClockMode::Accelerated,
            "manual" => ClockMode::Manual,
            "real" => ClockMode::Real,
            other => {
                tracing::warn!(mode = other, "Unknown clock mode, falling back to real");
                ClockMode::Real
            }
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ClockMode::Real => 0,
            ClockMode::Accelerated => 1,
            ClockMode::Manual => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ClockMode::Accelerated,
            2 => ClockMode::Manual,
            _ => ClockMode::Real,
        }
    }
}

/// Process-wide simulator clock.
pub struct SimClock {
    mode: AtomicU8,
    /// Bit pattern of the `f64` acceleration multiplier.
    multiplier_bits: AtomicU64,
    /// Wall-clock anchor, reset on every mutation.
    started_at: AtomicI64,
    /// Seconds of observed time ahead of the anchor.
    offset: AtomicI64,
    /// Serializes mutations; `now()` never takes it.
    mutate: Mutex<()>,
}

impl SimClock {
    /// Clock starting in real mode at the current wall-clock time.
    pub fn new() -> Self {
        Self {
            mode: AtomicU8::new(ClockMode::Real.as_u8()),
            multiplier_bits: AtomicU64::new(1.0f64.to_bits()),
            started_at: AtomicI64::new(wallclock()),
            offset: AtomicI64::new(0),
            mutate: Mutex::new(()),
        }
    }

    /// Clock in the configured mode and multiplier.
    pub fn from_config(config: &crate::config::ClockConfig) -> Self {
        let clock = Self::new();
        clock.set_mode(ClockMode::parse(&config.mode), Some(config.multiplier));
        clock
    }

    /// Manual-mode clock frozen at `start`, for deterministic tests.
    pub fn manual(start: i64) -> Self {
        let clock = Self::new();
        clock.set_mode(ClockMode::Manual, None);
        // Anchor observed time at the requested instant.
        let _guard = lock(&clock.mutate);
        let wall = wallclock();
        clock.started_at.store(wall, Ordering::Release);
        clock.offset.store(start - wall, Ordering::Release);
        drop(_guard);
        clock
    }

    /// Current mode.
    pub fn mode(&self) -> ClockMode {
        ClockMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    /// Current acceleration multiplier.
    pub fn multiplier(&self) -> f64 {
        f64::from_bits(self.multiplier_bits.load(Ordering::Acquire))
    }

    /// Advance observed time by `seconds`.
    ///
    /// In real mode the offset is recorded but unobservable, since real
    /// mode reads the wall clock directly.
    pub fn advance(&self, seconds: i64) {
        let _guard = lock(&self.mutate);
        self.rebase(seconds);
    }

    /// Advance by a duration broken into parts, summed into seconds.
    pub fn advance_parts(&self, days: i64, hours: i64, minutes: i64, seconds: i64) {
        self.advance(days * 86_400 + hours * 3_600 + minutes * 60 + seconds);
    }

    /// Switch mode, preserving the currently observed time.
    ///
    /// A missing or non-positive multiplier falls back to 1.0.
    pub fn set_mode(&self, mode: ClockMode, multiplier: Option<f64>) {
        let _guard = lock(&self.mutate);
        let multiplier = match multiplier {
            Some(m) if m.is_finite() && m > 0.0 => m,
            Some(m) => {
                tracing::warn!(multiplier = m, "Invalid clock multiplier, falling back to 1.0");
                1.0
            }
            None => 1.0,
        };
        self.rebase(0);
        self.multiplier_bits
            .store(multiplier.to_bits(), Ordering::Release);
        self.mode.store(mode.as_u8(), Ordering::Release);
    }

    /// Back to real time: mode real, multiplier 1, offset cleared.
    pub fn reset(&self) {
        let _guard = lock(&self.mutate);
        self.started_at.store(wallclock(), Ordering::Release);
        self.offset.store(0, Ordering::Release);
        self.multiplier_bits.store(1.0f64.to_bits(), Ordering::Release);
        self.mode.store(ClockMode::Real.as_u8(), Ordering::Release);
    }

    /// Re-anchor at the current wall-clock instant and add `extra`
    /// seconds of observed time. Caller holds the mutation lock.
    fn rebase(&self, extra: i64) {
        let current = self.now();
        let wall = wallclock();
        self.started_at.store(wall, Ordering::Release);
        self.offset.store(current - wall + extra, Ordering::Release);
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimClock {
    fn now(&self) -> i64 {
        let mode = ClockMode::from_u8(self.mode.load(Ordering::Acquire));
        let started_at = self.started_at.load(Ordering::Acquire);
        let offset = self.offset.load(Ordering::Acquire);
        match mode {
            ClockMode::Real => wallclock(),
            ClockMode::Accelerated => {
                let elapsed = (wallclock() - started_at) as f64 * self.multiplier();
                started_at + elapsed as i64 + offset
            }
            ClockMode::Manual => started_at + offset,
        }
    }
}

fn wallclock() -> i64 {
    chrono::Utc::now().timestamp()
}

fn lock(mutex: &Mutex<()>) -> std::sync::MutexGuard<'_, ()> {
    // Mutation sections cannot panic, so the lock cannot be poisoned.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
