//! Error types for the authorization decision engine

use thiserror::Error;

/// Decision engine errors
///
/// Only `InvalidRequest` and `Cancelled` are ever returned from the
/// evaluation path; everything else surfaces through the policy-admin
/// path or is resolved fail-closed into a Deny decision.
#[derive(Debug, Error)]
pub enum AdeError {
    /// Malformed request (missing principal, resource, or actions)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid policy definition rejected at add time
    #[error("Validation error: {0}")]
    Validation(String),

    /// Evaluation aborted by cancellation token or deadline
    #[error("Evaluation cancelled")]
    Cancelled,

    /// Unexpected invariant violation; callers see a fail-closed Deny
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, AdeError>;
