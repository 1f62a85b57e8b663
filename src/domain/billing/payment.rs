//! Payment intent and charge records.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ids, Namespace, StoredObject};

use super::decline::message_for_code;

/// Payment intent states the simulator produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    Succeeded,
    /// The platform's state for a declined intent awaiting a new method.
    RequiresPaymentMethod,
}

/// Charge states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Succeeded,
    Failed,
}

/// Decline detail attached to failed intents and charges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentError {
    pub code: String,
    pub message: String,
}

impl PaymentError {
    /// Build from a decline code using the fixed message table.
    pub fn from_code(code: impl Into<String>) -> Self {
        let code = code.into();
        let message = message_for_code(&code).to_string();
        Self { code, message }
    }
}

/// One attempt to collect a payment for an invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    #[serde(skip)]
    pub namespace: Namespace,
    pub created: i64,
    pub customer: String,
    pub invoice: String,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentIntentStatus,
    pub last_payment_error: Option<PaymentError>,
}

impl PaymentIntent {
    pub fn succeeded(
        namespace: Namespace,
        customer: impl Into<String>,
        invoice: impl Into<String>,
        amount: i64,
        currency: impl Into<String>,
        now: i64,
    ) -> Self {
        Self {
            id: ids::payment_intent_id(),
            namespace,
            created: now,
            customer: customer.into(),
            invoice: invoice.into(),
            amount,
            currency: currency.into(),
            status: PaymentIntentStatus::Succeeded,
            last_payment_error: None,
        }
    }

    pub fn declined(
        namespace: Namespace,
        customer: impl Into<String>,
        invoice: impl Into<String>,
        amount: i64,
        currency: impl Into<String>,
        decline_code: &str,
        now: i64,
    ) -> Self {
        Self {
            id: ids::payment_intent_id(),
            namespace,
            created: now,
            customer: customer.into(),
            invoice: invoice.into(),
            amount,
            currency: currency.into(),
            status: PaymentIntentStatus::RequiresPaymentMethod,
            last_payment_error: Some(PaymentError::from_code(decline_code)),
        }
    }
}

/// The money-movement record behind a payment intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Charge {
    pub id: String,
    #[serde(skip)]
    pub namespace: Namespace,
    pub created: i64,
    pub customer: String,
    pub invoice: String,
    pub payment_intent: String,
    pub amount: i64,
    pub currency: String,
    pub status: ChargeStatus,
    pub paid: bool,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
}

impl Charge {
    /// Charge matching a payment intent's outcome.
    pub fn for_intent(intent: &PaymentIntent, now: i64) -> Self {
        let failed = intent.last_payment_error.as_ref();
        Self {
            id: ids::charge_id(),
            namespace: intent.namespace.clone(),
            created: now,
            customer: intent.customer.clone(),
            invoice: intent.invoice.clone(),
            payment_intent: intent.id.clone(),
            amount: intent.amount,
            currency: intent.currency.clone(),
            status: if failed.is_some() {
                ChargeStatus::Failed
            } else {
                ChargeStatus::Succeeded
            },
            paid: failed.is_none(),
            failure_code: failed.map(|e| e.code.clone()),
            failure_message: failed.map(|e| e.message.clone()),
        }
    }
}

impl StoredObject for PaymentIntent {
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

impl StoredObject for Charge {
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
