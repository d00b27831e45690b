//! Session lifecycle status

use serde::{Deserialize, Serialize};

/// Lifecycle status of a feedback-loop session.
///
/// `NotStarted -> Active -> {Paused, Completed, Terminated, Error}`; a paused
/// session may resume to `Active`. Only `Active` sessions process data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    NotStarted,
    Active,
    Paused,
    Completed,
    Terminated,
    Error,
}

impl SessionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Active)
    }

    /// Whether the session has ended and is kept for reporting only.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Terminated | SessionStatus::Error
        )
    }

    /// Whether moving to `next` is a legal lifecycle transition.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, next) {
            (NotStarted, Active) => true,
            (Active, Paused) | (Paused, Active) => true,
            (Active | Paused, Completed | Terminated | Error) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::NotStarted => write!(f, "not-started"),
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Paused => write!(f, "paused"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Terminated => write!(f, "terminated"),
            SessionStatus::Error => write!(f, "error"),
        }
    }
}

/// Why a session is being stopped; selects its terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Normal end of the experience
    Completed,
    /// Ended early by the host or participant
    Terminated { reason: String },
    /// Ended because the host hit an unrecoverable fault
    Error { message: String },
}

impl StopReason {
    pub fn terminal_status(&self) -> SessionStatus {
        match self {
            StopReason::Completed => SessionStatus::Completed,
            StopReason::Terminated { .. } => SessionStatus::Terminated,
            StopReason::Error { .. } => SessionStatus::Error,
        }
    }
}
