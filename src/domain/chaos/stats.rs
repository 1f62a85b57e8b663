//! Per-namespace chaos counters.

use serde::Serialize;

/// Counters mutated only as a side effect of chaos decisions.
///
/// Reset together with configuration. The reordered counter counts the
/// full buffer length whenever an out-of-order flush runs on more than
/// one event, even if the shuffle happens to preserve order; that
/// overcount is observable, tested behavior and is kept as-is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChaosStats {
    pub payments_succeeded: u64,
    pub payments_failed: u64,
    pub events_duplicated: u64,
    pub events_reordered: u64,
    pub api_timeouts: u64,
    pub api_rate_limits: u64,
    pub api_errors: u64,
}
