//! Registered webhook endpoint.

use secrecy::SecretString;
use serde::Deserialize;

use crate::domain::foundation::{ids, Namespace, StoredObject};

/// Whether an endpoint receives deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointStatus {
    Enabled,
    Disabled,
}

/// A URL registered to receive signed event payloads.
///
/// `enabled_events` patterns are exact event-type strings or trailing
/// `*` wildcards (`invoice.*`, or `*` for everything).
#[derive(Clone)]
pub struct WebhookEndpoint {
    pub id: String,
    pub namespace: Namespace,
    pub created: i64,
    pub url: String,
    /// Signing secret; never serialized or logged.
    pub secret: SecretString,
    pub enabled_events: Vec<String>,
    pub status: EndpointStatus,
}

impl WebhookEndpoint {
    /// Register an enabled endpoint subscribed to everything.
    pub fn new(
        namespace: Namespace,
        url: impl Into<String>,
        secret: impl Into<String>,
        now: i64,
    ) -> Self {
        Self {
            id: ids::endpoint_id(),
            namespace,
            created: now,
            url: url.into(),
            secret: SecretString::new(secret.into()),
            enabled_events: vec!["*".to_string()],
            status: EndpointStatus::Enabled,
        }
    }

    /// Restrict the endpoint to specific event patterns.
    pub fn with_enabled_events(mut self, patterns: Vec<String>) -> Self {
        self.enabled_events = patterns;
        self
    }

    /// Whether deliveries should be attempted for this event type.
    pub fn accepts(&self, event_type: &str) -> bool {
        if self.status == EndpointStatus::Disabled {
            return false;
        }
        self.enabled_events
            .iter()
            .any(|pattern| pattern_matches(pattern, event_type))
    }
}

fn pattern_matches(pattern: &str, event_type: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return event_type.starts_with(prefix);
    }
    pattern == event_type
}

impl StoredObject for WebhookEndpoint {
    fn id(&self) -> &str {
        &self.id
    }

    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn created(&self) -> i64 {
        self.created
    }
}
