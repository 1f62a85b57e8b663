//! Error types for the simulation kernel.

use thiserror::Error;

/// Stable error codes the routing layer maps onto HTTP statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Missing store record. Recoverable; surfaced as a 404-equivalent.
    NotFound,
    /// Caller requested an unsupported simulated decline code.
    InvalidDeclineCode,
    /// Outbound webhook POST failed or timed out.
    TransportFailure,
    /// Idempotency reservation lost to a concurrent caller.
    RaceLost,
    /// Kernel invariant violated or a background worker is gone.
    Internal,
}

/// Errors raised by the kernel components.
///
/// Billing-cycle failures for a single subscription never surface as a
/// `SimError` from the scan; they are aggregated into the run summary.
#[derive(Debug, Clone, Error)]
pub enum SimError {
    #[error("No such {resource}: '{id}'")]
    NotFound { resource: &'static str, id: String },

    #[error("Unsupported decline code: '{0}'")]
    InvalidDeclineCode(String),

    /// Routing-layer surface for an exhausted delivery. Inside the
    /// kernel, transport failures land on the event's delivery log as
    /// attempts rather than erroring the delivery call.
    #[error("Webhook delivery failed: {0}")]
    Transport(String),

    /// Routing-layer surface for a lost idempotency reservation; see
    /// [`SimError::is_retryable`]. Inside the kernel, the loser
    /// re-reads the winner's entry instead of erroring.
    #[error("Idempotency reservation lost for key '{0}'")]
    RaceLost(String),

    #[error("Internal simulator error: {0}")]
    Internal(String),
}

impl SimError {
    /// Missing record for the given resource type.
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        SimError::NotFound {
            resource,
            id: id.into(),
        }
    }

    /// Internal error with a message.
    pub fn internal(message: impl Into<String>) -> Self {
        SimError::Internal(message.into())
    }

    /// The stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            SimError::NotFound { .. } => ErrorCode::NotFound,
            SimError::InvalidDeclineCode(_) => ErrorCode::InvalidDeclineCode,
            SimError::Transport(_) => ErrorCode::TransportFailure,
            SimError::RaceLost(_) => ErrorCode::RaceLost,
            SimError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether the routing layer should retry the operation transparently.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SimError::RaceLost(_) | SimError::Transport(_))
    }
}
