//! Signed webhook delivery with bounded retries.

mod deliverer;
mod http_transport;
mod signature;

pub use deliverer::{DeliveryResult, WebhookDeliverer};
pub use http_transport::HttpTransport;
pub use signature::{build_signature_header, sign_payload, verify_signature_header, SIGNATURE_HEADER};
