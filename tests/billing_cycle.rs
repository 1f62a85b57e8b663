//! Integration tests for the subscription billing cycle.
//!
//! These tests verify the end-to-end flow:
//! 1. A customer subscribes to a monthly price
//! 2. The manual clock advances past the period end
//! 3. BillingEngine scans, invoices and collects (or is declined by chaos)
//! 4. Every mutation lands as a stored event and reaches the event sink
//! 5. WebhookDeliverer posts the signed event to a registered endpoint
//!
//! Uses the in-memory sink and a capturing transport, so nothing leaves
//! the process.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use paysim::adapters::billing::{BillingEngine, BillingRunSummary, BillingStores};
use paysim::adapters::chaos::ChaosCoordinator;
use paysim::adapters::clock::SimClock;
use paysim::adapters::events::InMemoryEventSink;
use paysim::adapters::store::{CheckOutcome, IdempotencyCache, TypedStore};
use paysim::adapters::webhook::{verify_signature_header, DeliveryResult, WebhookDeliverer};
use paysim::config::AppConfig;
use paysim::domain::billing::{
    BillingInterval, Customer, InvoiceStatus, Price, Recurring, Subscription, SubscriptionItem,
    SubscriptionStatus,
};
use paysim::domain::chaos::{ChaosPatch, PaymentChaosPatch};
use paysim::domain::foundation::{prefixed_id, Namespace};
use paysim::domain::webhook::WebhookEndpoint;
use paysim::ports::{Clock, TransportOutcome, WebhookRequest, WebhookTransport};
use secrecy::SecretString;

// =============================================================================
// Test Infrastructure
// =============================================================================

/// Transport that accepts everything and records the requests.
struct CapturingTransport {
    requests: Mutex<Vec<WebhookRequest>>,
}

impl CapturingTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<WebhookRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookTransport for CapturingTransport {
    async fn post(&self, request: WebhookRequest) -> TransportOutcome {
        self.requests.lock().unwrap().push(request);
        TransportOutcome::Accepted(200)
    }
}

struct Sim {
    clock: Arc<SimClock>,
    chaos: Arc<ChaosCoordinator>,
    sink: Arc<InMemoryEventSink>,
    engine: Arc<BillingEngine>,
    customers: Arc<TypedStore<Customer>>,
    subscriptions: Arc<TypedStore<Subscription>>,
    invoices: Arc<TypedStore<paysim::domain::billing::Invoice>>,
    events: Arc<TypedStore<paysim::domain::foundation::EventRecord>>,
    endpoints: Arc<TypedStore<WebhookEndpoint>>,
    deliverer: Arc<WebhookDeliverer>,
    transport: Arc<CapturingTransport>,
}

/// Wire the whole kernel the way a server startup would, from defaults.
fn simulator() -> Sim {
    paysim::observability::init();
    let config = AppConfig::default();
    config.validate().expect("default config is valid");

    let clock = Arc::new(SimClock::manual(1_700_000_000));
    let sink = Arc::new(InMemoryEventSink::new());
    let chaos = ChaosCoordinator::new(sink.clone());

    let stores = BillingStores {
        customers: TypedStore::new("customer"),
        subscriptions: TypedStore::new("subscription"),
        invoices: TypedStore::new("invoice"),
        payment_intents: TypedStore::new("payment_intent"),
        charges: TypedStore::new("charge"),
        events: TypedStore::new("event"),
    };
    let customers = stores.customers.clone();
    let subscriptions = stores.subscriptions.clone();
    let invoices = stores.invoices.clone();
    let events = stores.events.clone();

    let engine = Arc::new(
        BillingEngine::new(clock.clone(), chaos.clone(), stores)
            .with_poll_interval(config.billing.poll_interval()),
    );

    let endpoints: Arc<TypedStore<WebhookEndpoint>> = TypedStore::new("webhook_endpoint");
    let transport = CapturingTransport::new();
    let deliverer = WebhookDeliverer::new(
        clock.clone(),
        events.clone(),
        endpoints.clone(),
        transport.clone(),
    )
    .with_request_timeout(config.webhook.request_timeout());

    Sim {
        clock,
        chaos,
        sink,
        engine,
        customers,
        subscriptions,
        invoices,
        events,
        endpoints,
        deliverer,
        transport,
    }
}

fn monthly_item(amount: i64) -> SubscriptionItem {
    SubscriptionItem {
        id: prefixed_id("si"),
        price: Some(Price {
            id: prefixed_id("price"),
            unit_amount: amount,
            currency: "usd".into(),
            recurring: Recurring {
                interval: BillingInterval::Month,
                interval_count: 1,
            },
        }),
        plan: None,
        quantity: 1,
    }
}

async fn seed_subscription(sim: &Sim, ns: &Namespace, amount: i64) -> Subscription {
    let now = sim.clock.now();
    let customer = sim
        .customers
        .insert(Customer::new(ns.clone(), now))
        .await
        .unwrap();
    sim.subscriptions
        .insert(Subscription::new(
            ns.clone(),
            customer.id,
            vec![monthly_item(amount)],
            now,
        ))
        .await
        .unwrap()
}

fn make_due(sim: &Sim, sub: &Subscription) {
    let gap = sub.current_period_end - sim.clock.now();
    sim.clock.advance(gap.max(0) + 1);
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn renewal_produces_signed_deliverable_webhooks() {
    let sim = simulator();
    let ns = Namespace::new("acct-1");
    let sub = seed_subscription(&sim, &ns, 2_500).await;
    make_due(&sim, &sub);

    let summary = sim.engine.process_billing(&ns).await.unwrap();
    assert_eq!(summary, BillingRunSummary { processed: 1, succeeded: 1, failed: 0 });

    // The paid invoice's event is stored and routed to the sink.
    let paid_events = sim.sink.emitted_of_type("invoice.paid");
    assert_eq!(paid_events.len(), 1);

    // Register an endpoint and deliver that event to it.
    let endpoint = sim
        .endpoints
        .insert(WebhookEndpoint::new(
            ns.clone(),
            "https://client.test/hooks",
            "whsec_integration",
            sim.clock.now(),
        ))
        .await
        .unwrap();
    let result = sim
        .deliverer
        .deliver_event_sync(&ns, &paid_events[0].id, &endpoint.id)
        .await
        .unwrap();
    assert_eq!(result, DeliveryResult::Delivered { attempts: 1 });

    // The posted payload verifies against the endpoint secret, exactly
    // as a client SDK would check it.
    let requests = sim.transport.requests();
    assert_eq!(requests.len(), 1);
    let secret = SecretString::new("whsec_integration".to_string());
    assert!(verify_signature_header(
        &requests[0].signature_header,
        &requests[0].body,
        &secret
    ));
    assert!(requests[0].body.contains(r#""type":"invoice.paid""#));

    // The delivery attempt is on the stored event record.
    let stored = sim.events.get(&ns, &paid_events[0].id).unwrap();
    assert_eq!(stored.delivery_attempts.len(), 1);
}

#[tokio::test]
async fn chaos_failure_rate_declines_and_schedules_retry() {
    let sim = simulator();
    let ns = Namespace::new("acct-1");
    sim.chaos.configure(
        &ns,
        ChaosPatch {
            payment: Some(PaymentChaosPatch {
                failure_rate: Some(1.0),
                decline_codes: Some(vec!["insufficient_funds".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        },
    );
    let sub = seed_subscription(&sim, &ns, 900).await;
    make_due(&sim, &sub);

    let t0 = sim.clock.now();
    let summary = sim.engine.process_billing(&ns).await.unwrap();
    assert_eq!(summary, BillingRunSummary { processed: 1, succeeded: 0, failed: 1 });

    let invoice = &sim.invoices.list_all(&ns)[0];
    assert_eq!(invoice.status, InvoiceStatus::Open);
    assert_eq!(invoice.attempt_count, 1);
    assert_eq!(invoice.next_payment_attempt, Some(t0 + 86_400));
    assert!(sim.sink.has_event("invoice.payment_failed"));
    assert_eq!(sim.chaos.get_stats(&ns).payments_failed, 1);

    // First failure does not flip the subscription.
    let sub = sim.subscriptions.get(&ns, &sub.id).unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn chaos_mode_picks_up_the_configured_default_rate() {
    let sim = simulator();
    let ns = Namespace::new("acct-1");
    let config = AppConfig::default();

    sim.chaos.set_mode(
        &ns,
        paysim::adapters::chaos::SimulationMode::Chaos,
        Some(config.simulation.default_failure_rate),
    );

    assert_eq!(sim.chaos.get_config(&ns).payment.failure_rate, 0.5);
}

#[tokio::test]
async fn concurrent_scans_of_one_namespace_bill_once() {
    let sim = simulator();
    let ns = Namespace::new("acct-1");
    let sub = seed_subscription(&sim, &ns, 1_200).await;
    make_due(&sim, &sub);

    // The periodic loop and a manual trigger can fire together; the
    // cycle must still produce exactly one invoice.
    let (a, b) = tokio::join!(
        sim.engine.process_billing(&ns),
        sim.engine.process_billing(&ns),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.succeeded + b.succeeded, 1);
    let invoices = sim.invoices.list_all(&ns);
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].status, InvoiceStatus::Paid);
    assert_eq!(sim.sink.emitted_of_type("invoice.created").len(), 1);
}

#[tokio::test]
async fn namespaces_bill_independently() {
    let sim = simulator();
    let failing = Namespace::new("acct-failing");
    let healthy = Namespace::new("acct-healthy");
    sim.chaos.configure(
        &failing,
        ChaosPatch {
            payment: Some(PaymentChaosPatch {
                failure_rate: Some(1.0),
                ..Default::default()
            }),
            ..Default::default()
        },
    );

    let failing_sub = seed_subscription(&sim, &failing, 1_000).await;
    let healthy_sub = seed_subscription(&sim, &healthy, 1_000).await;
    make_due(&sim, &failing_sub);
    make_due(&sim, &healthy_sub);

    let failing_summary = sim.engine.process_billing(&failing).await.unwrap();
    let healthy_summary = sim.engine.process_billing(&healthy).await.unwrap();

    assert_eq!(failing_summary.failed, 1);
    assert_eq!(healthy_summary.succeeded, 1);
    assert_eq!(sim.invoices.list_all(&failing)[0].status, InvoiceStatus::Open);
    assert_eq!(sim.invoices.list_all(&healthy)[0].status, InvoiceStatus::Paid);
}

#[tokio::test]
async fn replayed_request_key_returns_cached_response() {
    let sim = simulator();
    let ns = Namespace::new("acct-1");
    let cache = IdempotencyCache::new(sim.clock.clone());

    // First request wins the reservation and caches its response.
    let first = cache.check(&ns, "req-42").await.unwrap();
    assert_eq!(first, CheckOutcome::New);
    cache
        .store(&ns, "req-42", 200, serde_json::json!({"id": "sub_1"}))
        .await
        .unwrap();

    // The retry replays the cached body instead of re-executing.
    match cache.check(&ns, "req-42").await.unwrap() {
        CheckOutcome::Cached(response) => {
            assert_eq!(response.status, 200);
            assert_eq!(response.body["id"], "sub_1");
        }
        other => panic!("expected cached response, got {other:?}"),
    }

    // Other namespaces never see the key.
    let other_ns = Namespace::new("acct-2");
    assert_eq!(cache.check(&other_ns, "req-42").await.unwrap(), CheckOutcome::New);
}
