//! Foundation types shared by every part of the simulator.

mod errors;
mod events;
pub(crate) mod ids;
mod namespace;
mod record;

pub use errors::{ErrorCode, SimError};
pub use events::{DeliveryAttempt, DeliveryAttemptStatus, EventRecord};
pub use ids::{charge_id, customer_id, endpoint_id, event_id, invoice_id, payment_intent_id, prefixed_id, subscription_id};
pub use namespace::Namespace;
pub use record::StoredObject;
