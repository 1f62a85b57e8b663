//! Webhook endpoint model.

mod endpoint;

pub use endpoint::{EndpointStatus, WebhookEndpoint};
