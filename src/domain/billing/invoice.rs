//! Invoice record: one per billing cycle per subscription.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ids, Namespace, StoredObject};

/// Invoice lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Open,
    Paid,
    Void,
}

/// A bill for one subscription period.
///
/// The billing engine reuses an existing `open` invoice for a cycle
/// rather than creating duplicates, so re-running a scan without
/// advancing time is idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    #[serde(skip)]
    pub namespace: Namespace,
    pub created: i64,
    pub customer: String,
    pub subscription: String,
    pub status: InvoiceStatus,
    pub currency: String,
    pub amount_due: i64,
    pub amount_paid: i64,
    pub amount_remaining: i64,
    /// Failed payment attempts so far; drives the retry schedule and the
    /// past-due transition at four.
    pub attempt_count: u32,
    /// Simulator-clock time of the next scheduled retry, if any.
    pub next_payment_attempt: Option<i64>,
    pub period_start: i64,
    pub period_end: i64,
}

impl Invoice {
    /// Open a new invoice for a subscription's current period.
    pub fn open(
        namespace: Namespace,
        customer: impl Into<String>,
        subscription: impl Into<String>,
        amount_due: i64,
        currency: impl Into<String>,
        period_start: i64,
        period_end: i64,
        now: i64,
    ) -> Self {
        Self {
            id: ids::invoice_id(),
            namespace,
            created: now,
            customer: customer.into(),
            subscription: subscription.into(),
            status: InvoiceStatus::Open,
            currency: currency.into(),
            amount_due,
            amount_paid: 0,
            amount_remaining: amount_due,
            attempt_count: 0,
            next_payment_attempt: None,
            period_start,
            period_end,
        }
    }

    /// Settle the invoice in full.
    pub fn mark_paid(&mut self) {
        self.status = InvoiceStatus::Paid;
        self.amount_paid = self.amount_due;
        self.amount_remaining = 0;
        self.next_payment_attempt = None;
    }

    /// Record a failed attempt and schedule the next retry.
    pub fn record_failed_attempt(&mut self, next_attempt_at: i64) {
        self.attempt_count += 1;
        self.next_payment_attempt = Some(next_attempt_at);
    }

    /// Whether a payment attempt may run at `now` (the scheduled retry
    /// time, if any, has passed).
    pub fn attempt_allowed(&self, now: i64) -> bool {
        match self.next_payment_attempt {
            Some(at) => at <= now,
            None => true,
        }
    }
}

impl StoredObject for Invoice {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn invoice() -> Invoice {
        Invoice::open(Namespace::global(), "cus_1", "sub_1", 2500, "usd", 0, 100, 100)
    }

    #[test]
    fn mark_paid_settles_amounts() {
        let mut inv = invoice();
        inv.next_payment_attempt = Some(500);
        inv.mark_paid();

        assert_eq!(inv.status, InvoiceStatus::Paid);
        assert_eq!(inv.amount_paid, 2500);
        assert_eq!(inv.amount_remaining, 0);
        assert_eq!(inv.next_payment_attempt, None);
    }

    #[test]
    fn failed_attempt_increments_and_schedules() {
        let mut inv = invoice();
        inv.record_failed_attempt(86_500);

        assert_eq!(inv.attempt_count, 1);
        assert!(!inv.attempt_allowed(86_499));
        assert!(inv.attempt_allowed(86_500));
    }
}
