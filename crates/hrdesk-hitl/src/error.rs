//! HITL session error types.

use thiserror::Error;

/// Local validation failure. Never reaches the network layer; the session
/// state is unchanged when one is produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("leave tickets require a number of leave days")]
    LeaveDaysRequired,
}

/// Submission transport/server failure. Surfaced as a transient signal; the
/// session returns to its pre-submit state so the user can retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("submission failed: {0}")]
pub struct SubmitError(pub String);
