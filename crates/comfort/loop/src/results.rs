//! Result objects of the session lifecycle operations.
//!
//! Every public controller operation answers with an explicit result; internal
//! [`ControllerError`]s are rendered into its messages.

use chrono::{DateTime, Utc};
use comfort_types::{SessionId, SessionStatus};
use serde::{Deserialize, Serialize};

use crate::adjuster::ParameterAdjustmentResult;
use crate::detection::ComfortValidationResult;
use crate::effectiveness::EffectivenessUpdate;
use crate::error::ControllerError;
use crate::metrics::MetricsSnapshot;
use crate::rollback::RollbackResult;
use crate::scoring::ComfortScore;
use crate::trend::{ComfortPrediction, ComfortTrend};

/// Outcome of starting a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartResult {
    pub is_successful: bool,
    pub session_id: Option<SessionId>,
    pub messages: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl StartResult {
    pub fn started(session_id: SessionId, at: DateTime<Utc>) -> Self {
        Self {
            is_successful: true,
            session_id: Some(session_id),
            messages: vec!["feedback loop started".to_string()],
            timestamp: at,
        }
    }

    pub fn failed(error: &ControllerError, at: DateTime<Utc>) -> Self {
        Self {
            is_successful: false,
            session_id: None,
            messages: vec![error.to_string()],
            timestamp: at,
        }
    }
}

/// Outcome of processing one data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub session_id: SessionId,
    pub is_successful: bool,
    pub score: Option<ComfortScore>,
    pub trend: Option<ComfortTrend>,
    pub prediction: Option<ComfortPrediction>,
    pub validation: Option<ComfortValidationResult>,
    pub adjustment: Option<ParameterAdjustmentResult>,
    pub rollback: Option<RollbackResult>,
    pub effectiveness: Option<EffectivenessUpdate>,
    pub messages: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProcessingResult {
    pub fn failed(session_id: SessionId, error: &ControllerError, at: DateTime<Utc>) -> Self {
        Self {
            session_id,
            is_successful: false,
            score: None,
            trend: None,
            prediction: None,
            validation: None,
            adjustment: None,
            rollback: None,
            effectiveness: None,
            messages: vec![error.to_string()],
            timestamp: at,
        }
    }

    /// Whether this cycle committed an adjustment.
    pub fn adjusted(&self) -> bool {
        self.adjustment.as_ref().is_some_and(|a| a.is_successful)
    }

    /// Whether this cycle rolled the session back.
    pub fn rolled_back(&self) -> bool {
        self.rollback.as_ref().is_some_and(|r| r.is_successful)
    }
}

/// Outcome of stopping a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopResult {
    pub session_id: SessionId,
    pub is_successful: bool,
    pub status: Option<SessionStatus>,
    pub metrics: Option<MetricsSnapshot>,
    pub messages: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl StopResult {
    pub fn failed(session_id: SessionId, error: &ControllerError, at: DateTime<Utc>) -> Self {
        Self {
            session_id,
            is_successful: false,
            status: None,
            metrics: None,
            messages: vec![error.to_string()],
            timestamp: at,
        }
    }
}

/// Outcome of pausing or resuming a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChangeResult {
    pub session_id: SessionId,
    pub is_successful: bool,
    pub status: Option<SessionStatus>,
    pub messages: Vec<String>,
}

impl StatusChangeResult {
    pub fn changed(session_id: SessionId, status: SessionStatus) -> Self {
        Self {
            session_id,
            is_successful: true,
            status: Some(status),
            messages: vec![format!("session {}", status)],
        }
    }

    pub fn failed(session_id: SessionId, error: &ControllerError) -> Self {
        Self {
            session_id,
            is_successful: false,
            status: None,
            messages: vec![error.to_string()],
        }
    }
}

/// What one periodic tick did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub sessions_evaluated: usize,
    pub rollbacks: Vec<RollbackResult>,
    pub effectiveness: Vec<EffectivenessUpdate>,
}
