//! Error types for the comfort-loop crate.
//!
//! Internal failures are carried as [`ControllerError`]; public operations
//! render them into their result objects instead of returning them.

use comfort_types::{SessionId, SessionStatus};
use thiserror::Error;

/// Errors that can occur inside the feedback-loop controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// No active or archived session has this id.
    #[error("Session not found")]
    SessionNotFound(SessionId),

    /// The session exists but is not in a state that allows the operation.
    #[error("session {session_id} is {status}, expected active")]
    SessionNotActive {
        session_id: SessionId,
        status: SessionStatus,
    },

    /// The requested lifecycle transition is not allowed.
    #[error("session {session_id} cannot move from {from} to {to}")]
    InvalidTransition {
        session_id: SessionId,
        from: SessionStatus,
        to: SessionStatus,
    },

    /// A session with this id is already running.
    #[error("session {0} already exists")]
    SessionAlreadyExists(SessionId),

    /// Too many concurrently active sessions.
    #[error("active session capacity reached ({max})")]
    CapacityExceeded { max: usize },

    /// Configuration is incoherent.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A data point was malformed or arrived out of order.
    #[error("invalid data point: {0}")]
    InvalidDataPoint(String),

    /// The external settings validator failed to produce a verdict.
    #[error("settings validator failed: {0}")]
    Validator(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControllerError {
    /// Whether this error concerns session identity rather than session state.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ControllerError::SessionNotFound(_))
    }
}

/// Result type for controller operations.
pub type ControllerResult<T> = Result<T, ControllerError>;
