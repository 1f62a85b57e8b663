//! Stripe-style prefixed object identifiers.

use uuid::Uuid;

/// Generate a prefixed id like `cus_9f2b4c...` from a random UUID.
pub fn prefixed_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

/// `cus_` customer id.
pub fn customer_id() -> String {
    prefixed_id("cus")
}

/// `sub_` subscription id.
pub fn subscription_id() -> String {
    prefixed_id("sub")
}

/// `in_` invoice id.
pub fn invoice_id() -> String {
    prefixed_id("in")
}

/// `pi_` payment intent id.
pub fn payment_intent_id() -> String {
    prefixed_id("pi")
}

/// `ch_` charge id.
pub fn charge_id() -> String {
    prefixed_id("ch")
}

/// `evt_` event id.
pub fn event_id() -> String {
    prefixed_id("evt")
}

/// `we_` webhook endpoint id.
pub fn endpoint_id() -> String {
    prefixed_id("we")
}
