//! Feedback-loop event stream.
//!
//! Events are published on a broadcast channel while the emitting session is
//! locked, so each session's events arrive in order.

use chrono::{DateTime, Utc};
use comfort_types::{SessionId, SessionStatus, WaveMatrixSettings};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adjuster::ParameterAdjustmentResult;
use crate::detection::ComfortValidationResult;
use crate::effectiveness::EffectivenessUpdate;
use crate::metrics::MetricsSnapshot;
use crate::rollback::RollbackResult;

/// Envelope wrapping every feedback-loop event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEventEnvelope {
    /// Unique event ID
    pub id: Uuid,

    pub session_id: SessionId,

    pub timestamp: DateTime<Utc>,

    pub severity: EventSeverity,

    pub event: FeedbackEvent,
}

impl FeedbackEventEnvelope {
    pub fn new(session_id: SessionId, event: FeedbackEvent, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            timestamp,
            severity: event.severity(),
            event,
        }
    }
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Critical,
}

/// Feedback-loop events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FeedbackEvent {
    SessionStarted {
        initial_settings: WaveMatrixSettings,
    },

    ValidationPassed {
        result: Box<ComfortValidationResult>,
    },

    ValidationFailed {
        result: Box<ComfortValidationResult>,
    },

    ParametersAdjusted {
        result: Box<ParameterAdjustmentResult>,
    },

    /// An adjustment attempt was refused or rejected.
    AdjustmentRejected {
        result: Box<ParameterAdjustmentResult>,
    },

    EffectivenessRecorded {
        update: EffectivenessUpdate,
    },

    AutomaticRollbackTriggered {
        result: Box<RollbackResult>,
    },

    SessionPaused,

    SessionResumed,

    SessionStopped {
        status: SessionStatus,
        metrics: Box<MetricsSnapshot>,
    },
}

impl FeedbackEvent {
    pub fn severity(&self) -> EventSeverity {
        match self {
            FeedbackEvent::ValidationFailed { .. } | FeedbackEvent::AdjustmentRejected { .. } => {
                EventSeverity::Warning
            }
            FeedbackEvent::AutomaticRollbackTriggered { .. } => EventSeverity::Critical,
            FeedbackEvent::EffectivenessRecorded { .. } => EventSeverity::Debug,
            _ => EventSeverity::Info,
        }
    }

    /// Short kebab-case name, as used in logs and the simulator output.
    pub fn name(&self) -> &'static str {
        match self {
            FeedbackEvent::SessionStarted { .. } => "session-started",
            FeedbackEvent::ValidationPassed { .. } => "validation-passed",
            FeedbackEvent::ValidationFailed { .. } => "validation-failed",
            FeedbackEvent::ParametersAdjusted { .. } => "parameters-adjusted",
            FeedbackEvent::AdjustmentRejected { .. } => "adjustment-rejected",
            FeedbackEvent::EffectivenessRecorded { .. } => "effectiveness-recorded",
            FeedbackEvent::AutomaticRollbackTriggered { .. } => "automatic-rollback-triggered",
            FeedbackEvent::SessionPaused => "session-paused",
            FeedbackEvent::SessionResumed => "session-resumed",
            FeedbackEvent::SessionStopped { .. } => "session-stopped",
        }
    }
}

impl std::fmt::Display for FeedbackEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_takes_event_severity() {
        let envelope = FeedbackEventEnvelope::new(
            SessionId::generate(),
            FeedbackEvent::SessionPaused,
            Utc::now(),
        );
        assert_eq!(envelope.severity, EventSeverity::Info);
        assert_eq!(envelope.event.to_string(), "session-paused");
    }

    #[test]
    fn test_rollback_is_critical() {
        let result = RollbackResult::session_not_found(
            SessionId::generate(),
            "test".to_string(),
            Utc::now(),
        );
        let event = FeedbackEvent::AutomaticRollbackTriggered {
            result: Box::new(result),
        };
        assert_eq!(event.severity(), EventSeverity::Critical);
        assert_eq!(event.name(), "automatic-rollback-triggered");
    }

    #[test]
    fn test_envelope_serializes() {
        let envelope = FeedbackEventEnvelope::new(
            SessionId::generate(),
            FeedbackEvent::SessionStarted {
                initial_settings: WaveMatrixSettings::default(),
            },
            Utc::now(),
        );
        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json["event"]["SessionStarted"]["initial_settings"].is_object());
    }
}
