//! Namespace token isolating concurrent test runs.
//!
//! Every stored record's true key is `(namespace, id)`. No read or write
//! ever crosses a namespace boundary; clearing a namespace removes exactly
//! its records. Isolation is enforced by key composition, not by locks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel namespace for callers that do not run inside a test partition.
const GLOBAL: &str = "global";

/// Opaque token identifying one concurrent test run.
///
/// Resolved by the routing layer from a request header and threaded
/// explicitly into every store and coordinator call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    /// Create a namespace from an opaque token.
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        if token.is_empty() {
            return Self::global();
        }
        Self(token)
    }

    /// The shared "global" namespace used outside test partitions.
    pub fn global() -> Self {
        Self(GLOBAL.to_string())
    }

    /// Whether this is the global sentinel namespace.
    pub fn is_global(&self) -> bool {
        self.0 == GLOBAL
    }

    /// The raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::global()
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Namespace {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}
