//! Outbound webhook POST seam, mockable in tests.

use std::time::Duration;

use async_trait::async_trait;

/// One signed POST to a webhook endpoint.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub url: String,
    /// JSON event payload, exactly the signed bytes.
    pub body: String,
    /// Value of the `Stripe-Signature` header.
    pub signature_header: String,
    pub timeout: Duration,
}

/// How a delivery attempt concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportOutcome {
    /// 2xx response.
    Accepted(u16),
    /// Endpoint answered with a non-2xx status.
    Rejected(u16),
    /// Timeout or connection failure; the POST never completed.
    Failed(String),
}

/// Transport used by the webhook deliverer.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(&self, request: WebhookRequest) -> TransportOutcome;
}
