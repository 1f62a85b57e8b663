//! Delivery loop: sign, POST, classify, retry with exponential backoff.
//!
//! Async mode schedules the retry ladder on a spawned task; sync mode
//! blocks the caller through the full sequence (worst case ~31s) and
//! exists for test harnesses that need delivery completed before their
//! assertions run. Every attempt, including the terminal failure, is
//! appended to the event's delivery log in the store.

use std::sync::Arc;
use std::time::Duration;

use crate::adapters::store::TypedStore;
use crate::domain::foundation::{
    DeliveryAttempt, DeliveryAttemptStatus, EventRecord, Namespace, SimError,
};
use crate::domain::webhook::WebhookEndpoint;
use crate::ports::{Clock, TransportOutcome, WebhookRequest, WebhookTransport};

use super::build_signature_header;

/// Retries after the first attempt: 1s, 2s, 4s, 8s, 16s.
const MAX_RETRIES: u32 = 5;
const BASE_BACKOFF_MS: u64 = 1_000;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How a synchronous delivery concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    /// Endpoint accepted the payload within the retry budget.
    Delivered { attempts: u32 },
    /// Retry budget exhausted; a terminal failure was recorded.
    Failed { attempts: u32 },
    /// Endpoint disabled or not subscribed to this event type.
    Skipped,
}

/// Signs and posts events to registered endpoints.
pub struct WebhookDeliverer {
    clock: Arc<dyn Clock>,
    events: Arc<TypedStore<EventRecord>>,
    endpoints: Arc<TypedStore<WebhookEndpoint>>,
    transport: Arc<dyn WebhookTransport>,
    request_timeout: Duration,
}

impl WebhookDeliverer {
    pub fn new(
        clock: Arc<dyn Clock>,
        events: Arc<TypedStore<EventRecord>>,
        endpoints: Arc<TypedStore<WebhookEndpoint>>,
        transport: Arc<dyn WebhookTransport>,
    ) -> Arc<Self> {
        Arc::new(Self {
            clock,
            events,
            endpoints,
            transport,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Per-request timeout on outbound POSTs, from [`crate::config::WebhookConfig`].
    pub fn with_request_timeout(mut self: Arc<Self>, timeout: Duration) -> Arc<Self> {
        // No clones exist yet when called at construction time.
        if let Some(deliverer) = Arc::get_mut(&mut self) {
            deliverer.request_timeout = timeout;
        }
        self
    }

    /// Queue an asynchronous delivery. Returns once the attempt task is
    /// scheduled; retries happen in the background.
    pub fn deliver_event(
        self: &Arc<Self>,
        namespace: &Namespace,
        event_id: &str,
        endpoint_id: &str,
    ) -> Result<(), SimError> {
        let event = self.events.get(namespace, event_id)?;
        let endpoint = self.endpoints.get(namespace, endpoint_id)?;
        let deliverer = Arc::clone(self);
        let namespace = namespace.clone();
        tokio::spawn(async move {
            match deliverer.run_delivery(&namespace, event, endpoint).await {
                Ok(DeliveryResult::Failed { attempts }) => {
                    tracing::warn!(%namespace, attempts, "Webhook delivery exhausted retries");
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(%namespace, error = %err, "Webhook delivery aborted");
                }
            }
        });
        Ok(())
    }

    /// Deliver synchronously, blocking through the retry ladder.
    pub async fn deliver_event_sync(
        &self,
        namespace: &Namespace,
        event_id: &str,
        endpoint_id: &str,
    ) -> Result<DeliveryResult, SimError> {
        let event = self.events.get(namespace, event_id)?;
        let endpoint = self.endpoints.get(namespace, endpoint_id)?;
        self.run_delivery(namespace, event, endpoint).await
    }

    async fn run_delivery(
        &self,
        namespace: &Namespace,
        event: EventRecord,
        endpoint: WebhookEndpoint,
    ) -> Result<DeliveryResult, SimError> {
        if !endpoint.accepts(&event.event_type) {
            tracing::debug!(
                endpoint = %endpoint.id,
                event_type = %event.event_type,
                "Endpoint not subscribed; skipping delivery"
            );
            return Ok(DeliveryResult::Skipped);
        }

        let body = event.wire_payload().to_string();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let timestamp = self.clock.now();
            let signature_header = build_signature_header(&body, &endpoint.secret, timestamp);
            let outcome = self
                .transport
                .post(WebhookRequest {
                    url: endpoint.url.clone(),
                    body: body.clone(),
                    signature_header,
                    timeout: self.request_timeout,
                })
                .await;

            let exhausted = attempt > MAX_RETRIES;
            match outcome {
                TransportOutcome::Accepted(status) => {
                    self.append_attempt(
                        namespace,
                        &event.id,
                        DeliveryAttempt {
                            endpoint: endpoint.id.clone(),
                            attempt,
                            timestamp,
                            status: DeliveryAttemptStatus::Succeeded,
                            http_status: Some(status),
                            error: None,
                            terminal: false,
                        },
                    )
                    .await?;
                    return Ok(DeliveryResult::Delivered { attempts: attempt });
                }
                TransportOutcome::Rejected(status) => {
                    self.append_attempt(
                        namespace,
                        &event.id,
                        DeliveryAttempt {
                            endpoint: endpoint.id.clone(),
                            attempt,
                            timestamp,
                            status: DeliveryAttemptStatus::Failed,
                            http_status: Some(status),
                            error: None,
                            terminal: exhausted,
                        },
                    )
                    .await?;
                }
                TransportOutcome::Failed(message) => {
                    self.append_attempt(
                        namespace,
                        &event.id,
                        DeliveryAttempt {
                            endpoint: endpoint.id.clone(),
                            attempt,
                            timestamp,
                            status: DeliveryAttemptStatus::Failed,
                            http_status: None,
                            error: Some(message),
                            terminal: exhausted,
                        },
                    )
                    .await?;
                }
            }

            if exhausted {
                return Ok(DeliveryResult::Failed { attempts: attempt });
            }
            // 1s, 2s, 4s, 8s, 16s between attempts.
            let backoff = Duration::from_millis(BASE_BACKOFF_MS << (attempt - 1));
            tokio::time::sleep(backoff).await;
        }
    }

    /// Append to the event's delivery log inside the store writer, so
    /// concurrent deliveries to other endpoints never drop each other's
    /// attempts.
    async fn append_attempt(
        &self,
        namespace: &Namespace,
        event_id: &str,
        attempt: DeliveryAttempt,
    ) -> Result<(), SimError> {
        self.events
            .mutate(namespace, event_id, move |event| {
                event.delivery_attempts.push(attempt);
            })
            .await
    }
}
