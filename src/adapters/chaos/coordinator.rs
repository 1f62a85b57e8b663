//! Namespaced, configurable fault injector.
//!
//! All state is scoped per namespace: configuration, per-customer
//! decline overrides, statistics, the event buffer, and the pending
//! flush timer. Decision functions are consumed by the billing engine
//! (payment outcomes), the event emission path (buffering, duplication,
//! reordering), and the routing layer's API middleware (timeouts, rate
//! limits, server errors).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::domain::billing::{is_supported_code, GENERIC_DECLINE};
use crate::domain::chaos::{ApiOutcome, ChaosConfig, ChaosPatch, ChaosStats, ForcedApiFailure};
use crate::domain::foundation::{EventRecord, Namespace, SimError};
use crate::ports::EventSink;

/// Decision for one payment attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Approved,
    /// Declined with this decline code.
    Declined(String),
}

/// Legacy convenience modes wrapping `configure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationMode {
    /// Everything succeeds; equivalent to a reset.
    HappyPath,
    /// Randomized payment failures at the given rate.
    Chaos,
}

/// Default failure rate for `SimulationMode::Chaos` when none is given.
const DEFAULT_CHAOS_FAILURE_RATE: f64 = 0.5;

#[derive(Default)]
struct NamespaceChaos {
    config: ChaosConfig,
    /// Customer id to forced decline code; wins over randomized chaos.
    overrides: HashMap<String, String>,
    stats: ChaosStats,
    buffer: Vec<EventRecord>,
    /// At most one flush timer is pending per namespace.
    flush_scheduled: bool,
    /// Bumped on every flush or reset so stale timers become no-ops.
    flush_epoch: u64,
}

/// The fault-injection coordinator.
pub struct ChaosCoordinator {
    sink: Arc<dyn EventSink>,
    state: Mutex<HashMap<Namespace, NamespaceChaos>>,
}

impl ChaosCoordinator {
    pub fn new(sink: Arc<dyn EventSink>) -> Arc<Self> {
        Arc::new(Self {
            sink,
            state: Mutex::new(HashMap::new()),
        })
    }

    /// Deep-merge a partial configuration into a namespace's config.
    pub fn configure(&self, namespace: &Namespace, patch: ChaosPatch) {
        let mut state = self.lock();
        state.entry(namespace.clone()).or_default().config.apply(patch);
    }

    /// Snapshot of a namespace's configuration.
    pub fn get_config(&self, namespace: &Namespace) -> ChaosConfig {
        let mut state = self.lock();
        state.entry(namespace.clone()).or_default().config.clone()
    }

    /// Snapshot of a namespace's counters.
    pub fn get_stats(&self, namespace: &Namespace) -> ChaosStats {
        let mut state = self.lock();
        state.entry(namespace.clone()).or_default().stats
    }

    /// Restore defaults and zero statistics for one namespace, dropping
    /// any buffered events and cancelling a pending flush timer.
    pub fn reset(&self, namespace: &Namespace) {
        let mut state = self.lock();
        let entry = state.entry(namespace.clone()).or_default();
        let epoch = entry.flush_epoch;
        *entry = NamespaceChaos {
            flush_epoch: epoch + 1,
            ..NamespaceChaos::default()
        };
    }

    /// Force a decline code for a customer until explicitly cleared.
    pub fn simulate_failure(
        &self,
        namespace: &Namespace,
        customer: &str,
        code: &str,
    ) -> Result<(), SimError> {
        if !is_supported_code(code) {
            return Err(SimError::InvalidDeclineCode(code.to_string()));
        }
        let mut state = self.lock();
        state
            .entry(namespace.clone())
            .or_default()
            .overrides
            .insert(customer.to_string(), code.to_string());
        Ok(())
    }

    /// Remove a customer's forced decline.
    pub fn clear_simulation(&self, namespace: &Namespace, customer: &str) {
        let mut state = self.lock();
        state
            .entry(namespace.clone())
            .or_default()
            .overrides
            .remove(customer);
    }

    /// Legacy control surface: happy path resets, chaos sets a payment
    /// failure rate.
    pub fn set_mode(&self, namespace: &Namespace, mode: SimulationMode, failure_rate: Option<f64>) {
        match mode {
            SimulationMode::HappyPath => self.reset(namespace),
            SimulationMode::Chaos => {
                let rate = failure_rate.unwrap_or(DEFAULT_CHAOS_FAILURE_RATE);
                self.configure(
                    namespace,
                    ChaosPatch {
                        payment: Some(crate::domain::chaos::PaymentChaosPatch {
                            failure_rate: Some(rate),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                );
            }
        }
    }

    /// Decide whether a payment attempt succeeds for this customer.
    ///
    /// The customer override takes precedence over any randomized roll.
    pub fn payment_outcome(&self, namespace: &Namespace, customer: &str) -> PaymentOutcome {
        let mut state = self.lock();
        let entry = state.entry(namespace.clone()).or_default();

        if let Some(code) = entry.overrides.get(customer).cloned() {
            entry.stats.payments_failed += 1;
            tracing::debug!(%namespace, customer, code, "Payment declined by customer override");
            return PaymentOutcome::Declined(code);
        }

        let payment = &entry.config.payment;
        let mut rng = rand::thread_rng();
        if rng.gen::<f64>() < payment.failure_rate {
            let code = if payment.decline_weights.is_empty() {
                payment
                    .decline_codes
                    .choose(&mut rng)
                    .cloned()
                    .unwrap_or_else(|| GENERIC_DECLINE.to_string())
            } else {
                weighted_pick(&payment.decline_weights, rng.gen::<f64>())
            };
            entry.stats.payments_failed += 1;
            tracing::debug!(%namespace, customer, code, "Payment declined by chaos roll");
            return PaymentOutcome::Declined(code);
        }

        entry.stats.payments_succeeded += 1;
        PaymentOutcome::Approved
    }

    /// Route an event through chaos: buffered when a window is set,
    /// otherwise delivered immediately (possibly duplicated).
    pub async fn queue_event(
        self: &Arc<Self>,
        namespace: &Namespace,
        event: EventRecord,
    ) -> Result<(), SimError> {
        let window_ms = {
            let mut state = self.lock();
            let entry = state.entry(namespace.clone()).or_default();
            let window_ms = entry.config.events.buffer_window_ms;
            if window_ms > 0 {
                entry.buffer.push(event.clone());
                if entry.flush_scheduled {
                    return Ok(());
                }
                entry.flush_scheduled = true;
                let epoch = entry.flush_epoch;
                let coordinator = Arc::clone(self);
                let namespace = namespace.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(window_ms)).await;
                    if let Err(err) = coordinator.flush_if_current(&namespace, epoch).await {
                        tracing::warn!(%namespace, error = %err, "Buffered event flush failed");
                    }
                });
                return Ok(());
            }
            window_ms
        };
        debug_assert_eq!(window_ms, 0);
        self.deliver_with_chaos(namespace, event).await
    }

    /// Deliver the buffered events now, FIFO or shuffled.
    pub async fn flush_events(&self, namespace: &Namespace) -> Result<(), SimError> {
        let events = {
            let mut state = self.lock();
            let entry = state.entry(namespace.clone()).or_default();
            entry.flush_scheduled = false;
            entry.flush_epoch += 1;
            let mut events: Vec<EventRecord> = std::mem::take(&mut entry.buffer);
            if entry.config.events.out_of_order && events.len() > 1 {
                events.shuffle(&mut rand::thread_rng());
                // Counts the whole buffer even when the shuffle lands on
                // the original order; observable legacy behavior.
                entry.stats.events_reordered += events.len() as u64;
            }
            events
        };
        for event in events {
            self.deliver_with_chaos(namespace, event).await?;
        }
        Ok(())
    }

    /// Decide API-level failure for a request path.
    pub fn api_outcome(&self, namespace: &Namespace, path: &str) -> ApiOutcome {
        let mut state = self.lock();
        let entry = state.entry(namespace.clone()).or_default();
        let api = &entry.config.api;

        let forced = api.endpoint_overrides.get(path).copied();
        let timeout_ms = api.timeout_ms;
        let (t, r, e) = (api.timeout_rate, api.rate_limit_rate, api.error_rate);

        if let Some(failure) = forced {
            return match failure {
                ForcedApiFailure::Timeout => {
                    entry.stats.api_timeouts += 1;
                    ApiOutcome::Timeout { ms: timeout_ms }
                }
                ForcedApiFailure::RateLimit => {
                    entry.stats.api_rate_limits += 1;
                    ApiOutcome::RateLimited
                }
                ForcedApiFailure::Error => {
                    entry.stats.api_errors += 1;
                    ApiOutcome::ServerError
                }
            };
        }

        // One draw against cumulative bands; timeout wins over rate
        // limiting wins over server errors.
        let roll = rand::thread_rng().gen::<f64>();
        if roll < t {
            entry.stats.api_timeouts += 1;
            ApiOutcome::Timeout { ms: timeout_ms }
        } else if roll < t + r {
            entry.stats.api_rate_limits += 1;
            ApiOutcome::RateLimited
        } else if roll < t + r + e {
            entry.stats.api_errors += 1;
            ApiOutcome::ServerError
        } else {
            ApiOutcome::Ok
        }
    }

    /// Buffered events still waiting for a flush (test support).
    pub fn buffered_len(&self, namespace: &Namespace) -> usize {
        let mut state = self.lock();
        state.entry(namespace.clone()).or_default().buffer.len()
    }

    async fn flush_if_current(&self, namespace: &Namespace, epoch: u64) -> Result<(), SimError> {
        {
            let mut state = self.lock();
            let entry = state.entry(namespace.clone()).or_default();
            if entry.flush_epoch != epoch || !entry.flush_scheduled {
                // A manual flush or reset got here first.
                return Ok(());
            }
        }
        self.flush_events(namespace).await
    }

    /// Deliver once, and a second time when the duplicate roll hits.
    async fn deliver_with_chaos(
        &self,
        namespace: &Namespace,
        event: EventRecord,
    ) -> Result<(), SimError> {
        let duplicate = {
            let mut state = self.lock();
            let entry = state.entry(namespace.clone()).or_default();
            let rate = entry.config.events.duplicate_rate;
            let duplicate = rate > 0.0 && rand::thread_rng().gen::<f64>() < rate;
            if duplicate {
                entry.stats.events_duplicated += 1;
                tracing::debug!(%namespace, event_type = %event.event_type, "Duplicating event delivery");
            }
            duplicate
        };
        self.sink.emit(event.clone()).await?;
        if duplicate {
            self.sink.emit(event).await?;
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Namespace, NamespaceChaos>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Cumulative-weight selection: walk the codes accumulating weight and
/// pick the first whose running sum reaches `roll * total`. Falls back
/// to the generic code if rounding exhausts the list.
fn weighted_pick(weights: &std::collections::BTreeMap<String, f64>, roll: f64) -> String {
    let total: f64 = weights.values().filter(|w| w.is_finite() && **w > 0.0).sum();
    if total <= 0.0 {
        return GENERIC_DECLINE.to_string();
    }
    let target = roll * total;
    let mut acc = 0.0;
    for (code, weight) in weights {
        if !weight.is_finite() || *weight <= 0.0 {
            continue;
        }
        acc += weight;
        if acc >= target {
            return code.clone();
        }
    }
    GENERIC_DECLINE.to_string()
}
