//! Event sink implementations.

mod in_memory;

pub use in_memory::InMemoryEventSink;
