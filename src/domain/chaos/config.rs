//! Typed chaos configuration and its partial-update patches.
//!
//! Merges are deep: a patch section merges field-by-field into the
//! existing section, while scalar leaves replace outright. Omitted
//! fields leave current values untouched, so callers can flip one knob
//! without restating the rest of the tree.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Simulated payment-failure knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentChaos {
    /// Probability in `[0, 1]` that a payment attempt is declined.
    pub failure_rate: f64,
    /// Candidate decline codes for randomized declines.
    pub decline_codes: Vec<String>,
    /// Optional weights per code; empty means uniform selection.
    pub decline_weights: BTreeMap<String, f64>,
}

impl Default for PaymentChaos {
    fn default() -> Self {
        Self {
            failure_rate: 0.0,
            decline_codes: vec![
                "card_declined".to_string(),
                "insufficient_funds".to_string(),
                "expired_card".to_string(),
            ],
            decline_weights: BTreeMap::new(),
        }
    }
}

/// Event-delivery disruption knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventChaos {
    /// Deliver buffered events in randomized order on flush.
    pub out_of_order: bool,
    /// Probability in `[0, 1]` of delivering an event twice.
    pub duplicate_rate: f64,
    /// Buffering window in milliseconds; zero delivers immediately.
    pub buffer_window_ms: u64,
}

impl Default for EventChaos {
    fn default() -> Self {
        Self {
            out_of_order: false,
            duplicate_rate: 0.0,
            buffer_window_ms: 0,
        }
    }
}

/// Outcome forced for a specific endpoint path, overriding the bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForcedApiFailure {
    Timeout,
    RateLimit,
    Error,
}

/// API-level failure knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiChaos {
    /// Probability band for simulated timeouts.
    pub timeout_rate: f64,
    /// Probability band for simulated rate limiting.
    pub rate_limit_rate: f64,
    /// Probability band for simulated server errors.
    pub error_rate: f64,
    /// Stall duration reported with a simulated timeout.
    pub timeout_ms: u64,
    /// Per-path forced outcomes, checked before any random draw.
    pub endpoint_overrides: BTreeMap<String, ForcedApiFailure>,
}

impl Default for ApiChaos {
    fn default() -> Self {
        Self {
            timeout_rate: 0.0,
            rate_limit_rate: 0.0,
            error_rate: 0.0,
            timeout_ms: 5_000,
            endpoint_overrides: BTreeMap::new(),
        }
    }
}

/// The full chaos configuration tree, scoped per namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChaosConfig {
    #[serde(default)]
    pub payment: PaymentChaos,
    #[serde(default)]
    pub events: EventChaos,
    #[serde(default)]
    pub api: ApiChaos,
}

/// Decision returned to API middleware for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiOutcome {
    Ok,
    /// Stall the request for this many milliseconds, then time out.
    Timeout { ms: u64 },
    RateLimited,
    ServerError,
}

/// Partial update for [`PaymentChaos`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentChaosPatch {
    pub failure_rate: Option<f64>,
    pub decline_codes: Option<Vec<String>>,
    pub decline_weights: Option<BTreeMap<String, f64>>,
}

/// Partial update for [`EventChaos`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventChaosPatch {
    pub out_of_order: Option<bool>,
    pub duplicate_rate: Option<f64>,
    pub buffer_window_ms: Option<u64>,
}

/// Partial update for [`ApiChaos`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiChaosPatch {
    pub timeout_rate: Option<f64>,
    pub rate_limit_rate: Option<f64>,
    pub error_rate: Option<f64>,
    pub timeout_ms: Option<u64>,
    pub endpoint_overrides: Option<BTreeMap<String, ForcedApiFailure>>,
}

/// Partial update for the whole tree.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChaosPatch {
    pub payment: Option<PaymentChaosPatch>,
    pub events: Option<EventChaosPatch>,
    pub api: Option<ApiChaosPatch>,
}

impl ChaosConfig {
    /// Deep-merge a patch into this configuration.
    ///
    /// Sections present in the patch merge recursively; scalar and list
    /// leaves replace the existing value. Rates are clamped to `[0, 1]`
    /// rather than rejected, matching the fall-back-to-defaults policy.
    pub fn apply(&mut self, patch: ChaosPatch) {
        if let Some(payment) = patch.payment {
            if let Some(rate) = payment.failure_rate {
                self.payment.failure_rate = clamp_rate(rate);
            }
            if let Some(codes) = payment.decline_codes {
                self.payment.decline_codes = codes;
            }
            if let Some(weights) = payment.decline_weights {
                self.payment.decline_weights = weights;
            }
        }
        if let Some(events) = patch.events {
            if let Some(out_of_order) = events.out_of_order {
                self.events.out_of_order = out_of_order;
            }
            if let Some(rate) = events.duplicate_rate {
                self.events.duplicate_rate = clamp_rate(rate);
            }
            if let Some(window) = events.buffer_window_ms {
                self.events.buffer_window_ms = window;
            }
        }
        if let Some(api) = patch.api {
            if let Some(rate) = api.timeout_rate {
                self.api.timeout_rate = clamp_rate(rate);
            }
            if let Some(rate) = api.rate_limit_rate {
                self.api.rate_limit_rate = clamp_rate(rate);
            }
            if let Some(rate) = api.error_rate {
                self.api.error_rate = clamp_rate(rate);
            }
            if let Some(ms) = api.timeout_ms {
                self.api.timeout_ms = ms;
            }
            if let Some(overrides) = api.endpoint_overrides {
                self.api.endpoint_overrides = overrides;
            }
        }
    }
}

fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        return 0.0;
    }
    rate.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn patch_merges_one_leaf_leaving_siblings() {
        let mut config = ChaosConfig::default();
        config.payment.failure_rate = 0.25;
        config.events.buffer_window_ms = 500;

        config.apply(ChaosPatch {
            events: Some(EventChaosPatch {
                out_of_order: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        });

        // Sibling leaf in the patched section survives.
        assert_eq!(config.events.buffer_window_ms, 500);
        assert!(config.events.out_of_order);
        // Untouched section survives.
        assert_eq!(config.payment.failure_rate, 0.25);
    }

    #[test]
    fn list_leaves_replace_wholesale() {
        let mut config = ChaosConfig::default();
        config.apply(ChaosPatch {
            payment: Some(PaymentChaosPatch {
                decline_codes: Some(vec!["expired_card".into()]),
                ..Default::default()
            }),
            ..Default::default()
        });

        assert_eq!(config.payment.decline_codes, vec!["expired_card"]);
    }

    #[test]
    fn malformed_rates_fall_back_instead_of_failing() {
        let mut config = ChaosConfig::default();
        config.apply(ChaosPatch {
            payment: Some(PaymentChaosPatch {
                failure_rate: Some(7.5),
                ..Default::default()
            }),
            api: Some(ApiChaosPatch {
                timeout_rate: Some(f64::NAN),
                ..Default::default()
            }),
            ..Default::default()
        });

        assert_eq!(config.payment.failure_rate, 1.0);
        assert_eq!(config.api.timeout_rate, 0.0);
    }

    #[test]
    fn patch_deserializes_from_partial_json() {
        let patch: ChaosPatch =
            serde_json::from_value(serde_json::json!({
                "payment": { "failure_rate": 0.5 },
                "api": { "endpoint_overrides": { "/v1/charges": "timeout" } },
            }))
            .unwrap();

        let mut config = ChaosConfig::default();
        config.apply(patch);
        assert_eq!(config.payment.failure_rate, 0.5);
        assert_eq!(
            config.api.endpoint_overrides.get("/v1/charges"),
            Some(&ForcedApiFailure::Timeout)
        );
    }

    proptest! {
        // Applying an empty patch never changes the tree, and applying the
        // same full patch twice is idempotent.
        #[test]
        fn empty_patch_is_identity(failure_rate in 0.0f64..1.0, window in 0u64..10_000) {
            let mut config = ChaosConfig::default();
            config.payment.failure_rate = failure_rate;
            config.events.buffer_window_ms = window;
            let before = config.clone();

            config.apply(ChaosPatch::default());
            prop_assert_eq!(config, before);
        }

        #[test]
        fn applying_a_patch_twice_is_idempotent(rate in 0.0f64..1.0, dup in 0.0f64..1.0) {
            let patch = || ChaosPatch {
                payment: Some(PaymentChaosPatch { failure_rate: Some(rate), ..Default::default() }),
                events: Some(EventChaosPatch { duplicate_rate: Some(dup), ..Default::default() }),
                api: None,
            };
            let mut once = ChaosConfig::default();
            once.apply(patch());
            let mut twice = ChaosConfig::default();
            twice.apply(patch());
            twice.apply(patch());
            prop_assert_eq!(once, twice);
        }
    }
}
