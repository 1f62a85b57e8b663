//! Namespaced data layer and the idempotency cache built on it.

mod idempotency;
mod typed_store;

pub use idempotency::{CachedResponse, CheckOutcome, IdempotencyCache, IdempotencyEntry};
pub use typed_store::{ListOptions, ListPage, TypedStore};
