//! Domain events and their delivery log.
//!
//! An event is immutable once created: `event_type` and `data.object`
//! (a point-in-time snapshot of the affected resource) never change.
//! The only mutable part is `delivery_attempts`, appended to by the
//! webhook deliverer as it works through its retry ladder.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::{ids, Namespace, StoredObject};

/// Outcome of a single webhook delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryAttemptStatus {
    /// Endpoint answered 2xx.
    Succeeded,
    /// Non-2xx response, transport failure, or the terminal give-up.
    Failed,
}

/// One entry in an event's delivery log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    /// Webhook endpoint the payload was posted to.
    pub endpoint: String,
    /// 1-based attempt number within the retry ladder.
    pub attempt: u32,
    /// Simulator-clock time of the attempt, unix seconds.
    pub timestamp: i64,
    pub status: DeliveryAttemptStatus,
    /// HTTP status when the endpoint answered at all.
    pub http_status: Option<u16>,
    /// Transport error message, if the POST never completed.
    pub error: Option<String>,
    /// Set on the final failed attempt once retries are exhausted.
    pub terminal: bool,
}

/// Immutable record of a state change, the unit fanned out to webhooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub object: String,
    /// Outward event-type string, e.g. `invoice.paid`,
    /// `customer.subscription.updated`.
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(skip)]
    pub namespace: Namespace,
    pub created: i64,
    pub data: EventData,
    /// Appended to by the webhook deliverer; never rewritten.
    #[serde(default)]
    pub delivery_attempts: Vec<DeliveryAttempt>,
}

/// Snapshot payload of the affected resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    pub object: JsonValue,
}

impl EventRecord {
    /// Create an event carrying a snapshot of the affected resource.
    pub fn new(
        namespace: Namespace,
        event_type: impl Into<String>,
        object: JsonValue,
        created: i64,
    ) -> Self {
        Self {
            id: ids::event_id(),
            object: "event".to_string(),
            event_type: event_type.into(),
            namespace,
            created,
            data: EventData { object },
            delivery_attempts: Vec::new(),
        }
    }

    /// The wire payload posted to webhook endpoints.
    ///
    /// Excludes the delivery log: endpoints see the event, not the
    /// simulator's bookkeeping about delivering it.
    pub fn wire_payload(&self) -> JsonValue {
        serde_json::json!({
            "id": self.id,
            "object": self.object,
            "type": self.event_type,
            "created": self.created,
            "data": { "object": self.data.object },
        })
    }
}

impl StoredObject for EventRecord {
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
