//! Contract every stored record type implements.

use super::Namespace;

/// A record addressable by `(namespace, id)` in a typed store.
///
/// `created` is a unix-second timestamp taken from the simulator clock at
/// insertion time; the store sorts list pages newest-first on it.
pub trait StoredObject: Clone + Send + Sync + 'static {
    /// The record's unique id within its namespace.
    fn id(&self) -> &str;

    /// The namespace this record belongs to.
    fn namespace(&self) -> &Namespace;

    /// Creation time in unix seconds.
    fn created(&self) -> i64;
}
