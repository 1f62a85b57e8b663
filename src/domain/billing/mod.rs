//! Billing records mirroring the simulated payment platform's objects.

mod customer;
mod decline;
mod invoice;
mod payment;
mod subscription;

pub use customer::Customer;
pub use decline::{is_supported_code, message_for_code, GENERIC_DECLINE, SUPPORTED_DECLINE_CODES};
pub use invoice::{Invoice, InvoiceStatus};
pub use payment::{Charge, ChargeStatus, PaymentError, PaymentIntent, PaymentIntentStatus};
pub use subscription::{
    BillingInterval, Plan, Price, Recurring, Subscription, SubscriptionItem, SubscriptionStatus,
};
