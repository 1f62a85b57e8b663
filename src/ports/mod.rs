//! Port traits: the seams between the kernel and its collaborators.

mod clock;
mod event_sink;
mod webhook_transport;

pub use clock::Clock;
pub use event_sink::EventSink;
pub use webhook_transport::{TransportOutcome, WebhookRequest, WebhookTransport};
