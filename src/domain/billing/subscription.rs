//! Subscription record and billing-period arithmetic.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ids, Namespace, StoredObject};

const DAY_SECS: i64 = 86_400;
const WEEK_SECS: i64 = 7 * DAY_SECS;
/// Months are fixed 30-day periods in the simulator.
const MONTH_SECS: i64 = 30 * DAY_SECS;
const YEAR_SECS: i64 = 365 * DAY_SECS;

/// Subscription lifecycle states.
///
/// `Canceled` is terminal and excludes the subscription from billing
/// scans. `PastDue` is entered after four consecutive failed payment
/// attempts; recovery back to `Active` is an explicit resource-layer
/// operation, never automatic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Canceled,
}

/// Billing interval of a price or legacy plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    Day,
    Week,
    Month,
    Year,
    /// Unrecognized interval strings land here and bill as 30-day months.
    #[serde(other)]
    Unknown,
}

impl BillingInterval {
    /// Fixed length of one interval in seconds.
    pub fn seconds(self) -> i64 {
        match self {
            BillingInterval::Day => DAY_SECS,
            BillingInterval::Week => WEEK_SECS,
            BillingInterval::Month => MONTH_SECS,
            BillingInterval::Year => YEAR_SECS,
            BillingInterval::Unknown => MONTH_SECS,
        }
    }
}

/// Recurrence settings of a price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recurring {
    pub interval: BillingInterval,
    #[serde(default = "default_interval_count")]
    pub interval_count: u32,
}

fn default_interval_count() -> u32 {
    1
}

/// Current-model price reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Price {
    pub id: String,
    pub unit_amount: i64,
    pub currency: String,
    pub recurring: Recurring,
}

/// Legacy plan reference, still accepted on old subscriptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub interval: BillingInterval,
}

/// One line item of a subscription; carries either a price or a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionItem {
    pub id: String,
    pub price: Option<Price>,
    pub plan: Option<Plan>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

/// A recurring billing agreement for one customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    #[serde(skip)]
    pub namespace: Namespace,
    pub created: i64,
    pub customer: String,
    pub status: SubscriptionStatus,
    pub current_period_start: i64,
    pub current_period_end: i64,
    pub cancel_at_period_end: bool,
    pub items: Vec<SubscriptionItem>,
}

impl Subscription {
    /// Create an active subscription with its first period open.
    pub fn new(
        namespace: Namespace,
        customer: impl Into<String>,
        items: Vec<SubscriptionItem>,
        now: i64,
    ) -> Self {
        let interval = items
            .first()
            .map(|item| item.interval())
            .unwrap_or(BillingInterval::Month);
        Self {
            id: ids::subscription_id(),
            namespace,
            created: now,
            customer: customer.into(),
            status: SubscriptionStatus::Active,
            current_period_start: now,
            current_period_end: now + interval.seconds(),
            cancel_at_period_end: false,
            items,
        }
    }

    /// Whether the billing scan should consider this subscription at all.
    pub fn is_scannable(&self) -> bool {
        matches!(
            self.status,
            SubscriptionStatus::Trialing | SubscriptionStatus::Active
        )
    }

    /// Whether the current period has elapsed at `now`.
    pub fn is_due(&self, now: i64) -> bool {
        self.current_period_end <= now
    }

    /// Renewal amount and currency from the first line item.
    ///
    /// Prices win over legacy plans. `None` when the subscription has no
    /// billable item; the scan skips it.
    pub fn renewal_amount(&self) -> Option<(i64, String)> {
        let item = self.items.first()?;
        if let Some(price) = &item.price {
            return Some((price.unit_amount, price.currency.clone()));
        }
        item.plan
            .as_ref()
            .map(|plan| (plan.amount, plan.currency.clone()))
    }

    /// The billing interval of the first line item.
    pub fn interval(&self) -> BillingInterval {
        self.items
            .first()
            .map(|item| item.interval())
            .unwrap_or(BillingInterval::Unknown)
    }

    /// Advance the period by one billing interval. The new period starts
    /// where the old one ended so no billable time is lost or doubled.
    pub fn advance_period(&mut self) {
        let interval = self.interval().seconds();
        self.current_period_start = self.current_period_end;
        self.current_period_end += interval;
    }
}

impl SubscriptionItem {
    /// Interval from the price, falling back to the legacy plan.
    pub fn interval(&self) -> BillingInterval {
        if let Some(price) = &self.price {
            return price.recurring.interval;
        }
        self.plan
            .as_ref()
            .map(|plan| plan.interval)
            .unwrap_or(BillingInterval::Unknown)
    }
}

impl StoredObject for Subscription {
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
