//! Rollback manager.
//!
//! A rollback restores the session's last known good settings (or its initial
//! settings), discards the adjustment budget and any pending effectiveness
//! evaluation, and records the reversion. It is a safety action: no rate or
//! count limit applies to it.

use chrono::{DateTime, Utc};
use comfort_types::{
    AdjustmentType, ComfortIssue, SessionId, WaveMatrixSettings, WaveParameterAdjustment,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::session::{FeedbackSession, RollbackRecord};

/// Which settings a rollback restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollbackTarget {
    LastKnownGood,
    Initial,
}

/// Outcome of a rollback request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackResult {
    pub session_id: SessionId,
    pub is_successful: bool,
    pub reason: String,
    pub target: Option<RollbackTarget>,
    pub settings_before: Option<WaveMatrixSettings>,
    pub restored_settings: Option<WaveMatrixSettings>,

    /// Number of automatic adjustments discarded from the budget.
    pub cleared_adjustments: usize,

    /// The rollback record itself.
    pub record: Option<WaveParameterAdjustment>,

    pub messages: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl RollbackResult {
    /// Failure for an unknown session.
    pub fn session_not_found(session_id: SessionId, reason: String, at: DateTime<Utc>) -> Self {
        Self {
            session_id,
            is_successful: false,
            reason,
            target: None,
            settings_before: None,
            restored_settings: None,
            cleared_adjustments: 0,
            record: None,
            messages: vec!["Session not found".to_string()],
            timestamp: at,
        }
    }
}

/// Stateless rollback executor.
#[derive(Debug, Clone, Copy, Default)]
pub struct RollbackManager;

impl RollbackManager {
    /// Revert `session` to its rollback target.
    ///
    /// `kind` is [`AdjustmentType::Rollback`] for controller-initiated
    /// reversions and [`AdjustmentType::Emergency`] for host requests.
    pub fn rollback(
        &self,
        session: &mut FeedbackSession,
        kind: AdjustmentType,
        reason: impl Into<String>,
        triggering_issues: Vec<ComfortIssue>,
        at: DateTime<Utc>,
    ) -> RollbackResult {
        let reason = reason.into();
        let target = if session.last_known_good.is_some() {
            RollbackTarget::LastKnownGood
        } else {
            RollbackTarget::Initial
        };

        let before = session.current_settings.clone();
        let restored = session.rollback_target().clone();
        let record = WaveParameterAdjustment::new(kind, reason.clone(), before.clone(), restored.clone(), at)
            .with_issues(triggering_issues);

        let cleared = std::mem::take(&mut session.adjustment_history);
        let cleared_adjustments = cleared.len();

        session.current_settings = restored.clone();
        session.pending_evaluation = None;
        session.consecutive_failures = 0;
        session.metrics.rollbacks += 1;
        session.rollback_history.push(RollbackRecord {
            record: record.clone(),
            cleared,
        });

        warn!(
            session_id = %session.id,
            kind = %kind,
            target = ?target,
            cleared_adjustments,
            reason = %reason,
            "Session settings rolled back"
        );

        let mut messages = vec![format!("rolled back: {}", reason)];
        if before == restored {
            messages.push("settings already at rollback target".to_string());
        }

        RollbackResult {
            session_id: session.id.clone(),
            is_successful: true,
            reason,
            target: Some(target),
            settings_before: Some(before),
            restored_settings: Some(restored),
            cleared_adjustments,
            record: Some(record),
            messages,
            timestamp: at,
        }
    }
}
