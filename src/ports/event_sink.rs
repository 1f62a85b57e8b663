//! Typed domain-event fan-out.

use async_trait::async_trait;

use crate::domain::foundation::{EventRecord, SimError};

/// Receives domain events after chaos buffering and duplication.
///
/// The routing layer subscribes an implementation at startup and maps
/// events to webhook fan-out; tests subscribe an in-memory sink to
/// assert on emitted events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one event. Implementations must tolerate duplicates and
    /// arbitrary ordering; both are injected deliberately by chaos.
    async fn emit(&self, event: EventRecord) -> Result<(), SimError>;
}
