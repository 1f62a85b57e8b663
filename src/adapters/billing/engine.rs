//! Periodic scan-and-process loop advancing subscription billing.
//!
//! Each invocation fetches due subscriptions, finds or creates the
//! cycle's open invoice, asks the chaos coordinator whether the payment
//! succeeds, and writes the resulting intent/charge/invoice records
//! back, emitting a domain event for every mutation. Failures for one
//! subscription never abort the scan; they aggregate into the summary.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex as AsyncMutex};

use crate::adapters::chaos::{ChaosCoordinator, PaymentOutcome};
use crate::adapters::store::TypedStore;
use crate::domain::billing::{
    Charge, Customer, Invoice, InvoiceStatus, PaymentIntent, Subscription, SubscriptionStatus,
};
use crate::domain::foundation::{EventRecord, Namespace, SimError};
use crate::ports::Clock;

/// Consecutive failed attempts before a subscription goes past due.
const PAST_DUE_ATTEMPTS: u32 = 4;

const DAY_SECS: i64 = 86_400;

/// Retry schedule: 1 day, 3 days, 5 days, then 7 days for all further
/// attempts.
fn retry_delay(attempt_count: u32) -> i64 {
    match attempt_count {
        0 | 1 => DAY_SECS,
        2 => 3 * DAY_SECS,
        3 => 5 * DAY_SECS,
        _ => 7 * DAY_SECS,
    }
}

/// Outcome counts for one billing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BillingRunSummary {
    /// Subscriptions a payment attempt or cancellation ran for.
    pub processed: u64,
    /// Attempts that collected payment.
    pub succeeded: u64,
    /// Attempts that were declined or errored.
    pub failed: u64,
}

/// The stores the engine reads and writes.
pub struct BillingStores {
    pub customers: Arc<TypedStore<Customer>>,
    pub subscriptions: Arc<TypedStore<Subscription>>,
    pub invoices: Arc<TypedStore<Invoice>>,
    pub payment_intents: Arc<TypedStore<PaymentIntent>>,
    pub charges: Arc<TypedStore<Charge>>,
    pub events: Arc<TypedStore<EventRecord>>,
}

enum AttemptOutcome {
    Paid,
    Declined,
    /// Period elapsed with `cancel_at_period_end` set.
    Canceled,
    /// Retry not yet due; nothing attempted.
    Deferred,
}

/// The billing engine.
pub struct BillingEngine {
    clock: Arc<dyn Clock>,
    chaos: Arc<ChaosCoordinator>,
    stores: BillingStores,
    poll_interval: Duration,
    /// One scan runs per namespace at a time; see `process_billing`.
    scan_locks: Mutex<HashMap<Namespace, Arc<AsyncMutex<()>>>>,
}

impl BillingEngine {
    pub fn new(clock: Arc<dyn Clock>, chaos: Arc<ChaosCoordinator>, stores: BillingStores) -> Self {
        Self {
            clock,
            chaos,
            stores,
            poll_interval: Duration::from_secs(1),
            scan_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Override the scan interval (default one second).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run the periodic scan until shutdown flips true.
    ///
    /// Each tick processes every namespace with live subscriptions
    /// independently.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
                _ = interval.tick() => {
                    for namespace in self.stores.subscriptions.namespaces() {
                        if let Err(err) = self.process_billing(&namespace).await {
                            tracing::warn!(%namespace, error = %err, "Billing scan failed");
                        }
                    }
                }
            }
        }
    }

    /// Scan one namespace now. Also the manual control-surface trigger,
    /// used directly by deterministic manual-clock tests.
    pub async fn process_billing(&self, namespace: &Namespace) -> Result<BillingRunSummary, SimError> {
        // The periodic loop and the manual trigger can overlap. Two
        // interleaved scans would each see no open invoice for a due
        // subscription and both create one, so scans of a namespace
        // are serialized.
        let lock = self.scan_lock(namespace);
        let _scan = lock.lock().await;

        let now = self.clock.now();
        let due: Vec<Subscription> = self
            .stores
            .subscriptions
            .list_all(namespace)
            .into_iter()
            .filter(|sub| sub.is_scannable() && sub.is_due(now))
            .collect();

        let mut summary = BillingRunSummary::default();
        for subscription in due {
            match self.process_subscription(namespace, subscription, now).await {
                Ok(AttemptOutcome::Paid) => {
                    summary.processed += 1;
                    summary.succeeded += 1;
                }
                Ok(AttemptOutcome::Declined) => {
                    summary.processed += 1;
                    summary.failed += 1;
                }
                Ok(AttemptOutcome::Canceled) => {
                    summary.processed += 1;
                }
                Ok(AttemptOutcome::Deferred) => {}
                Err(err) => {
                    // Isolated: one subscription's failure never aborts
                    // the scan of the others.
                    summary.processed += 1;
                    summary.failed += 1;
                    tracing::warn!(%namespace, error = %err, "Subscription processing failed");
                }
            }
        }

        if summary.processed > 0 {
            tracing::info!(
                %namespace,
                processed = summary.processed,
                succeeded = summary.succeeded,
                failed = summary.failed,
                "Billing run complete"
            );
        }
        Ok(summary)
    }

    fn scan_lock(&self, namespace: &Namespace) -> Arc<AsyncMutex<()>> {
        self.scan_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(namespace.clone())
            .or_default()
            .clone()
    }

    async fn process_subscription(
        &self,
        namespace: &Namespace,
        mut subscription: Subscription,
        now: i64,
    ) -> Result<AttemptOutcome, SimError> {
        if subscription.cancel_at_period_end {
            subscription.status = SubscriptionStatus::Canceled;
            let subscription = self.stores.subscriptions.update(subscription).await?;
            self.emit(namespace, "customer.subscription.deleted", &subscription, now)
                .await?;
            return Ok(AttemptOutcome::Canceled);
        }

        let customer = self
            .stores
            .customers
            .get(namespace, &subscription.customer)?;

        let Some((amount, currency)) = subscription.renewal_amount() else {
            tracing::warn!(
                subscription = %subscription.id,
                "Subscription has no billable item; skipping"
            );
            return Ok(AttemptOutcome::Deferred);
        };

        let mut invoice = match self.find_open_invoice(namespace, &subscription.id) {
            Some(existing) => existing,
            None => {
                let invoice = self
                    .stores
                    .invoices
                    .insert(Invoice::open(
                        namespace.clone(),
                        customer.id.clone(),
                        subscription.id.clone(),
                        amount,
                        currency.clone(),
                        subscription.current_period_start,
                        subscription.current_period_end,
                        now,
                    ))
                    .await?;
                self.emit(namespace, "invoice.created", &invoice, now).await?;
                invoice
            }
        };

        if !invoice.attempt_allowed(now) {
            return Ok(AttemptOutcome::Deferred);
        }

        match self.chaos.payment_outcome(namespace, &customer.id) {
            PaymentOutcome::Approved => {
                self.settle_invoice(namespace, &mut subscription, &mut invoice, now)
                    .await?;
                Ok(AttemptOutcome::Paid)
            }
            PaymentOutcome::Declined(code) => {
                self.record_decline(namespace, &mut subscription, &mut invoice, &code, now)
                    .await?;
                Ok(AttemptOutcome::Declined)
            }
        }
    }

    /// The cycle's open invoice, if one already exists. Reused rather
    /// than duplicated, so re-running a scan is idempotent.
    fn find_open_invoice(&self, namespace: &Namespace, subscription_id: &str) -> Option<Invoice> {
        self.stores
            .invoices
            .list_all(namespace)
            .into_iter()
            .find(|inv| inv.subscription == subscription_id && inv.status == InvoiceStatus::Open)
    }

    async fn settle_invoice(
        &self,
        namespace: &Namespace,
        subscription: &mut Subscription,
        invoice: &mut Invoice,
        now: i64,
    ) -> Result<(), SimError> {
        let intent = self
            .stores
            .payment_intents
            .insert(PaymentIntent::succeeded(
                namespace.clone(),
                invoice.customer.clone(),
                invoice.id.clone(),
                invoice.amount_due,
                invoice.currency.clone(),
                now,
            ))
            .await?;
        self.emit(namespace, "payment_intent.created", &intent, now).await?;
        self.emit(namespace, "payment_intent.succeeded", &intent, now).await?;

        let charge = self
            .stores
            .charges
            .insert(Charge::for_intent(&intent, now))
            .await?;
        self.emit(namespace, "charge.succeeded", &charge, now).await?;

        invoice.mark_paid();
        let invoice = self.stores.invoices.update(invoice.clone()).await?;
        self.emit(namespace, "invoice.paid", &invoice, now).await?;

        subscription.advance_period();
        let subscription = self.stores.subscriptions.update(subscription.clone()).await?;
        self.emit(namespace, "customer.subscription.updated", &subscription, now)
            .await?;
        Ok(())
    }

    async fn record_decline(
        &self,
        namespace: &Namespace,
        subscription: &mut Subscription,
        invoice: &mut Invoice,
        decline_code: &str,
        now: i64,
    ) -> Result<(), SimError> {
        let intent = self
            .stores
            .payment_intents
            .insert(PaymentIntent::declined(
                namespace.clone(),
                invoice.customer.clone(),
                invoice.id.clone(),
                invoice.amount_due,
                invoice.currency.clone(),
                decline_code,
                now,
            ))
            .await?;
        self.emit(namespace, "payment_intent.created", &intent, now).await?;
        self.emit(namespace, "payment_intent.payment_failed", &intent, now)
            .await?;

        let charge = self
            .stores
            .charges
            .insert(Charge::for_intent(&intent, now))
            .await?;
        self.emit(namespace, "charge.failed", &charge, now).await?;

        invoice.record_failed_attempt(now + retry_delay(invoice.attempt_count + 1));
        let invoice = self.stores.invoices.update(invoice.clone()).await?;
        self.emit(namespace, "invoice.payment_failed", &invoice, now).await?;

        if invoice.attempt_count >= PAST_DUE_ATTEMPTS {
            subscription.status = SubscriptionStatus::PastDue;
            let subscription = self.stores.subscriptions.update(subscription.clone()).await?;
            self.emit(namespace, "customer.subscription.updated", &subscription, now)
                .await?;

            let mut customer = self.stores.customers.get(namespace, &invoice.customer)?;
            if !customer.delinquent {
                customer.delinquent = true;
                let customer = self.stores.customers.update(customer).await?;
                self.emit(namespace, "customer.updated", &customer, now).await?;
            }

            tracing::info!(
                subscription = %subscription.id,
                attempts = invoice.attempt_count,
                "Subscription past due after repeated payment failures"
            );
        }
        Ok(())
    }

    /// Store a domain event carrying a snapshot of `object`, then route
    /// it through chaos to the sink.
    async fn emit<T: Serialize>(
        &self,
        namespace: &Namespace,
        event_type: &str,
        object: &T,
        now: i64,
    ) -> Result<(), SimError> {
        let snapshot = serde_json::to_value(object)
            .map_err(|err| SimError::internal(format!("event snapshot: {err}")))?;
        let event = EventRecord::new(namespace.clone(), event_type, snapshot, now);
        let event = self.stores.events.insert(event).await?;
        self.chaos.queue_event(namespace, event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::SimClock;
    use crate::adapters::events::InMemoryEventSink;
    use crate::domain::billing::{BillingInterval, Price, Recurring, SubscriptionItem};

    struct Harness {
        clock: Arc<SimClock>,
        chaos: Arc<ChaosCoordinator>,
        sink: Arc<InMemoryEventSink>,
        engine: Arc<BillingEngine>,
        customers: Arc<TypedStore<Customer>>,
        subscriptions: Arc<TypedStore<Subscription>>,
        invoices: Arc<TypedStore<Invoice>>,
        charges: Arc<TypedStore<Charge>>,
        ns: Namespace,
    }

    fn stores() -> BillingStores {
        BillingStores {
            customers: TypedStore::new("customer"),
            subscriptions: TypedStore::new("subscription"),
            invoices: TypedStore::new("invoice"),
            payment_intents: TypedStore::new("payment_intent"),
            charges: TypedStore::new("charge"),
            events: TypedStore::new("event"),
        }
    }

    async fn harness() -> Harness {
        let clock = Arc::new(SimClock::manual(1_000_000));
        let sink = Arc::new(InMemoryEventSink::new());
        let chaos = ChaosCoordinator::new(sink.clone());
        let stores = stores();
        let customers = stores.customers.clone();
        let subscriptions = stores.subscriptions.clone();
        let invoices = stores.invoices.clone();
        let charges = stores.charges.clone();
        let engine = Arc::new(BillingEngine::new(clock.clone(), chaos.clone(), stores));
        Harness {
            clock,
            chaos,
            sink,
            engine,
            customers,
            subscriptions,
            invoices,
            charges,
            ns: Namespace::new("run-a"),
        }
    }

    fn monthly_item(amount: i64) -> SubscriptionItem {
        SubscriptionItem {
            id: crate::domain::foundation::prefixed_id("si"),
            price: Some(Price {
                id: crate::domain::foundation::prefixed_id("price"),
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

    async fn seed_subscription(h: &Harness) -> Subscription {
        let now = h.clock.now();
        let customer = h
            .customers
            .insert(Customer::new(h.ns.clone(), now))
            .await
            .unwrap();
        h.subscriptions
            .insert(Subscription::new(
                h.ns.clone(),
                customer.id,
                vec![monthly_item(2_500)],
                now,
            ))
            .await
            .unwrap()
    }

    /// Advance past the current period end.
    fn make_due(h: &Harness, sub: &Subscription) {
        let gap = sub.current_period_end - h.clock.now();
        h.clock.advance(gap.max(0) + 1);
    }

    #[tokio::test]
    async fn happy_path_renewal_pays_invoice_and_advances_period() {
        let h = harness().await;
        let sub = seed_subscription(&h).await;
        let old_end = sub.current_period_end;
        make_due(&h, &sub);

        let summary = h.engine.process_billing(&h.ns).await.unwrap();
        assert_eq!(summary, BillingRunSummary { processed: 1, succeeded: 1, failed: 0 });

        let invoice = &h.invoices.list_all(&h.ns)[0];
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert_eq!(invoice.amount_paid, 2_500);
        assert_eq!(invoice.amount_remaining, 0);

        let renewed = h.subscriptions.get(&h.ns, &sub.id).unwrap();
        assert_eq!(renewed.current_period_start, old_end);
        assert_eq!(renewed.current_period_end, old_end + 30 * 86_400);

        for event_type in [
            "invoice.created",
            "payment_intent.created",
            "payment_intent.succeeded",
            "charge.succeeded",
            "invoice.paid",
            "customer.subscription.updated",
        ] {
            assert!(h.sink.has_event(event_type), "missing {event_type}");
        }
    }

    #[tokio::test]
    async fn not_yet_due_subscription_is_untouched() {
        let h = harness().await;
        seed_subscription(&h).await;

        let summary = h.engine.process_billing(&h.ns).await.unwrap();

        assert_eq!(summary, BillingRunSummary::default());
        assert!(h.invoices.list_all(&h.ns).is_empty());
    }

    #[tokio::test]
    async fn second_run_reuses_open_invoice() {
        let h = harness().await;
        let sub = seed_subscription(&h).await;
        h.chaos
            .simulate_failure(&h.ns, &sub.customer, "card_declined")
            .unwrap();
        make_due(&h, &sub);

        h.engine.process_billing(&h.ns).await.unwrap();
        // Retry due a day later; still the same cycle.
        h.clock.advance(86_401);
        h.engine.process_billing(&h.ns).await.unwrap();

        let invoices = h.invoices.list_all(&h.ns);
        assert_eq!(invoices.len(), 1, "open invoice must be reused, not duplicated");
        assert_eq!(invoices[0].attempt_count, 2);
    }

    #[tokio::test]
    async fn declined_payment_schedules_retries_on_the_fixed_ladder() {
        let h = harness().await;
        let sub = seed_subscription(&h).await;
        h.chaos
            .simulate_failure(&h.ns, &sub.customer, "insufficient_funds")
            .unwrap();
        make_due(&h, &sub);

        let t0 = h.clock.now();
        h.engine.process_billing(&h.ns).await.unwrap();

        let invoice = &h.invoices.list_all(&h.ns)[0];
        assert_eq!(invoice.attempt_count, 1);
        assert_eq!(invoice.next_payment_attempt, Some(t0 + 86_400));

        let charge = &h.charges.list_all(&h.ns)[0];
        assert_eq!(charge.failure_code.as_deref(), Some("insufficient_funds"));
        assert_eq!(
            charge.failure_message.as_deref(),
            Some("Your card has insufficient funds.")
        );
    }

    #[tokio::test]
    async fn retry_does_not_run_before_its_scheduled_time() {
        let h = harness().await;
        let sub = seed_subscription(&h).await;
        h.chaos
            .simulate_failure(&h.ns, &sub.customer, "card_declined")
            .unwrap();
        make_due(&h, &sub);

        h.engine.process_billing(&h.ns).await.unwrap();
        // An hour later the retry is still a day away.
        h.clock.advance(3_600);
        let summary = h.engine.process_billing(&h.ns).await.unwrap();

        assert_eq!(summary, BillingRunSummary::default());
        assert_eq!(h.invoices.list_all(&h.ns)[0].attempt_count, 1);
    }

    #[tokio::test]
    async fn past_due_exactly_on_the_fourth_failure() {
        let h = harness().await;
        let sub = seed_subscription(&h).await;
        h.chaos
            .simulate_failure(&h.ns, &sub.customer, "card_declined")
            .unwrap();
        make_due(&h, &sub);

        // Attempts 1-3: 1 day, 3 days, 5 days between retries.
        for (attempt, delay) in [(1u32, 86_400i64), (2, 3 * 86_400), (3, 5 * 86_400)] {
            h.engine.process_billing(&h.ns).await.unwrap();
            let status = h.subscriptions.get(&h.ns, &sub.id).unwrap().status;
            assert_eq!(
                status,
                SubscriptionStatus::Active,
                "still active after attempt {attempt}"
            );
            assert!(!h.customers.get(&h.ns, &sub.customer).unwrap().delinquent);
            h.clock.advance(delay + 1);
        }

        // Fourth failure flips the subscription and marks the customer.
        h.engine.process_billing(&h.ns).await.unwrap();
        let status = h.subscriptions.get(&h.ns, &sub.id).unwrap().status;
        assert_eq!(status, SubscriptionStatus::PastDue);
        assert!(h.customers.get(&h.ns, &sub.customer).unwrap().delinquent);
        assert!(h.sink.has_event("customer.updated"));

        // Past-due subscriptions drop out of later scans.
        h.clock.advance(7 * 86_400 + 1);
        let summary = h.engine.process_billing(&h.ns).await.unwrap();
        assert_eq!(summary, BillingRunSummary::default());
    }

    #[tokio::test]
    async fn successful_retry_pays_invoice_without_reactivating_status() {
        let h = harness().await;
        let sub = seed_subscription(&h).await;
        h.chaos
            .simulate_failure(&h.ns, &sub.customer, "card_declined")
            .unwrap();
        make_due(&h, &sub);

        h.engine.process_billing(&h.ns).await.unwrap();
        h.chaos.clear_simulation(&h.ns, &sub.customer);
        h.clock.advance(86_401);
        let summary = h.engine.process_billing(&h.ns).await.unwrap();

        assert_eq!(summary.succeeded, 1);
        assert_eq!(h.invoices.list_all(&h.ns)[0].status, InvoiceStatus::Paid);
    }

    #[tokio::test]
    async fn cancel_at_period_end_cancels_instead_of_renewing() {
        let h = harness().await;
        let mut sub = seed_subscription(&h).await;
        sub.cancel_at_period_end = true;
        let sub = h.subscriptions.update(sub).await.unwrap();
        make_due(&h, &sub);

        let summary = h.engine.process_billing(&h.ns).await.unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.succeeded + summary.failed, 0);
        let canceled = h.subscriptions.get(&h.ns, &sub.id).unwrap();
        assert_eq!(canceled.status, SubscriptionStatus::Canceled);
        assert!(h.invoices.list_all(&h.ns).is_empty());
        assert!(h.sink.has_event("customer.subscription.deleted"));
    }

    #[tokio::test]
    async fn overlapping_scans_bill_a_cycle_exactly_once() {
        let h = harness().await;
        let sub = seed_subscription(&h).await;
        make_due(&h, &sub);

        let (a, b) = tokio::join!(
            h.engine.process_billing(&h.ns),
            h.engine.process_billing(&h.ns),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        // One scan collects the renewal; the other sees nothing due.
        assert_eq!(a.succeeded + b.succeeded, 1);
        assert_eq!(h.invoices.list_all(&h.ns).len(), 1);
    }

    #[tokio::test]
    async fn one_bad_subscription_does_not_abort_the_scan() {
        let h = harness().await;
        let good = seed_subscription(&h).await;
        // A subscription whose customer record is missing.
        let orphan = h
            .subscriptions
            .insert(Subscription::new(
                h.ns.clone(),
                "cus_missing",
                vec![monthly_item(900)],
                h.clock.now(),
            ))
            .await
            .unwrap();
        make_due(&h, &good);
        make_due(&h, &orphan);

        let summary = h.engine.process_billing(&h.ns).await.unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn retry_schedule_is_1_3_5_then_7_days() {
        assert_eq!(retry_delay(1), 86_400);
        assert_eq!(retry_delay(2), 3 * 86_400);
        assert_eq!(retry_delay(3), 5 * 86_400);
        assert_eq!(retry_delay(4), 7 * 86_400);
        assert_eq!(retry_delay(9), 7 * 86_400);
    }
}
