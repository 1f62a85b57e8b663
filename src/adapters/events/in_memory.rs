//! In-memory event sink.
//!
//! Synchronous, deterministic delivery to registered callbacks plus
//! event capture for assertions. This is what the routing layer wires
//! up at startup (subscribing its webhook fan-out) and what tests use
//! to observe emitted events.

use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;

use crate::domain::foundation::{EventRecord, SimError};
use crate::ports::EventSink;

type Callback = Arc<dyn Fn(&EventRecord) + Send + Sync>;

/// Callback-list event sink with capture helpers.
#[derive(Default)]
pub struct InMemoryEventSink {
    subscribers: RwLock<Vec<Callback>>,
    emitted: Mutex<Vec<EventRecord>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked for every emitted event.
    pub fn subscribe(&self, callback: impl Fn(&EventRecord) + Send + Sync + 'static) {
        self.subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Arc::new(callback));
    }

    // === Test helpers ===

    /// All emitted events, in emission order.
    pub fn emitted(&self) -> Vec<EventRecord> {
        self.emitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Emitted events of one type.
    pub fn emitted_of_type(&self, event_type: &str) -> Vec<EventRecord> {
        self.emitted()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    /// Number of emitted events.
    pub fn count(&self) -> usize {
        self.emitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Whether an event of this type was emitted.
    pub fn has_event(&self, event_type: &str) -> bool {
        self.emitted().iter().any(|e| e.event_type == event_type)
    }

    /// Forget captured events (test isolation).
    pub fn clear(&self) {
        self.emitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn emit(&self, event: EventRecord) -> Result<(), SimError> {
        let callbacks: Vec<Callback> = self
            .subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        for callback in callbacks {
            callback(&event);
        }
        self.emitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Namespace;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(event_type: &str) -> EventRecord {
        EventRecord::new(Namespace::new("ns"), event_type, json!({}), 1)
    }

    #[tokio::test]
    async fn emit_captures_and_invokes_subscribers() {
        let sink = InMemoryEventSink::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        sink.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        sink.emit(event("invoice.paid")).await.unwrap();
        sink.emit(event("charge.succeeded")).await.unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(sink.count(), 2);
        assert!(sink.has_event("invoice.paid"));
        assert_eq!(sink.emitted_of_type("charge.succeeded").len(), 1);
    }

    #[tokio::test]
    async fn clear_forgets_captured_events() {
        let sink = InMemoryEventSink::new();
        sink.emit(event("invoice.paid")).await.unwrap();
        sink.clear();
        assert_eq!(sink.count(), 0);
    }
}
