//! Session state.
//!
//! A [`FeedbackSession`] is owned by exactly one in-flight call at a time: the
//! controller wraps it in a [`SessionHandle`] whose async mutex serializes
//! processing, and whose cancellation flag lets a stop discard work that is
//! suspended on the settings validator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use comfort_types::{
    AdjustmentId, ComfortDataPoint, ComfortIssue, ComfortValidationThresholds, DataPointId, SessionId,
    SessionStatus, StopReason, WaveMatrixSettings, WaveParameterAdjustment,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::ControllerConfig;
use crate::metrics::{FeedbackLoopMetrics, MetricsSnapshot};
use crate::scoring::ComfortScore;
use crate::trend::{ComfortTrend, ScoreWindow, TrendAnalyzer};

/// Adjustment waiting for enough later data to measure its effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEvaluation {
    pub adjustment_id: AdjustmentId,

    pub committed_at: DateTime<Utc>,

    /// Score the adjustment is measured against.
    pub baseline: f64,

    /// Scores observed since the adjustment was committed.
    pub samples: Vec<f64>,
}

/// Live state of one feedback-loop session.
#[derive(Debug, Clone)]
pub struct FeedbackSession {
    pub id: SessionId,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub stop_reason: Option<StopReason>,

    pub initial_settings: WaveMatrixSettings,
    pub current_settings: WaveMatrixSettings,
    pub last_known_good: Option<WaveMatrixSettings>,

    /// Committed automatic adjustments; bounded by the adjustment budget.
    pub adjustment_history: Vec<WaveParameterAdjustment>,

    /// Committed manual adjustments.
    pub manual_history: Vec<WaveParameterAdjustment>,

    /// Rollback records, including the adjustments each one cleared.
    pub rollback_history: Vec<RollbackRecord>,

    pub comfort_history: Vec<ComfortDataPoint>,
    pub latest_score: Option<ComfortScore>,
    pub window: ScoreWindow,

    /// Issues found by the most recent evaluation.
    pub current_issues: Vec<ComfortIssue>,

    pub pending_evaluation: Option<PendingEvaluation>,
    pub consecutive_failures: u32,

    /// Data point whose score last triggered a rollback.
    pub last_rollback_point: Option<DataPointId>,

    pub thresholds: ComfortValidationThresholds,
    pub config: Arc<ControllerConfig>,
    pub metrics: FeedbackLoopMetrics,
}

/// A rollback and the adjustment history it discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackRecord {
    pub record: WaveParameterAdjustment,
    pub cleared: Vec<WaveParameterAdjustment>,
}

impl FeedbackSession {
    /// New active session at `initial_settings`.
    pub fn start(
        id: SessionId,
        initial_settings: WaveMatrixSettings,
        config: Arc<ControllerConfig>,
        at: DateTime<Utc>,
    ) -> Self {
        let window = TrendAnalyzer::new(config.trend.clone()).window();
        Self {
            id,
            status: SessionStatus::Active,
            started_at: at,
            ended_at: None,
            stop_reason: None,
            current_settings: initial_settings.clone(),
            initial_settings,
            last_known_good: None,
            adjustment_history: Vec::new(),
            manual_history: Vec::new(),
            rollback_history: Vec::new(),
            comfort_history: Vec::new(),
            latest_score: None,
            window,
            current_issues: Vec::new(),
            pending_evaluation: None,
            consecutive_failures: 0,
            last_rollback_point: None,
            thresholds: config.thresholds.clone(),
            config,
            metrics: FeedbackLoopMetrics::new(),
        }
    }

    /// Settings a rollback restores.
    pub fn rollback_target(&self) -> &WaveMatrixSettings {
        self.last_known_good
            .as_ref()
            .unwrap_or(&self.initial_settings)
    }

    /// Time of the most recent committed automatic adjustment.
    pub fn last_adjustment_at(&self) -> Option<DateTime<Utc>> {
        self.adjustment_history.last().map(|a| a.applied_at)
    }

    /// Timestamp of the most recent accepted data point.
    pub fn last_data_at(&self) -> Option<DateTime<Utc>> {
        self.comfort_history.last().map(|p| p.timestamp)
    }

    /// Find a committed adjustment (automatic or manual) by id.
    pub fn adjustment_mut(&mut self, id: &AdjustmentId) -> Option<&mut WaveParameterAdjustment> {
        self.adjustment_history
            .iter_mut()
            .chain(self.manual_history.iter_mut())
            .find(|a| &a.id == id)
    }

    /// Every adjustment the session ever committed, rollbacks included.
    pub fn all_adjustments(&self) -> Vec<&WaveParameterAdjustment> {
        let mut all: Vec<&WaveParameterAdjustment> = self
            .adjustment_history
            .iter()
            .chain(self.manual_history.iter())
            .chain(
                self.rollback_history
                    .iter()
                    .flat_map(|r| r.cleared.iter().chain(std::iter::once(&r.record))),
            )
            .collect();
        all.sort_by_key(|a| a.applied_at);
        all
    }

    pub fn trend(&self) -> ComfortTrend {
        TrendAnalyzer::new(self.config.trend.clone()).analyze(&self.window)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            status: self.status,
            started_at: self.started_at,
            ended_at: self.ended_at,
            stop_reason: self.stop_reason.clone(),
            initial_settings: self.initial_settings.clone(),
            current_settings: self.current_settings.clone(),
            last_known_good: self.last_known_good.clone(),
            adjustment_count: self.adjustment_history.len(),
            manual_adjustment_count: self.manual_history.len(),
            rollback_count: self.rollback_history.len(),
            data_points: self.comfort_history.len(),
            latest_score: self.latest_score.as_ref().map(|s| s.score),
            trend: self.trend(),
            thresholds: self.thresholds.clone(),
            metrics: self.metrics.snapshot(),
        }
    }
}

/// Read-only view of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub stop_reason: Option<StopReason>,
    pub initial_settings: WaveMatrixSettings,
    pub current_settings: WaveMatrixSettings,
    pub last_known_good: Option<WaveMatrixSettings>,
    pub adjustment_count: usize,
    pub manual_adjustment_count: usize,
    pub rollback_count: usize,
    pub data_points: usize,
    pub latest_score: Option<f64>,
    pub trend: ComfortTrend,
    pub thresholds: ComfortValidationThresholds,
    pub metrics: MetricsSnapshot,
}

/// Shared handle to an active session.
#[derive(Debug)]
pub struct SessionHandle {
    state: Mutex<FeedbackSession>,
    cancelled: AtomicBool,
}

impl SessionHandle {
    pub fn new(session: FeedbackSession) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(session),
            cancelled: AtomicBool::new(false),
        })
    }

    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, FeedbackSession> {
        self.state.lock().await
    }

    /// Mark the session as stopping; in-flight work must not commit.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comfort_types::{AdjustmentType, WaveParameter};

    fn session() -> FeedbackSession {
        FeedbackSession::start(
            SessionId::generate(),
            WaveMatrixSettings::default(),
            Arc::new(ControllerConfig::default()),
            Utc::now(),
        )
    }

    #[test]
    fn test_new_session_is_active_at_initial_settings() {
        let session = session();
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.current_settings, session.initial_settings);
        assert!(session.last_known_good.is_none());
        assert_eq!(session.rollback_target(), &session.initial_settings);
    }

    #[test]
    fn test_rollback_target_prefers_last_known_good() {
        let mut session = session();
        let good = WaveMatrixSettings::default().with(WaveParameter::Speed, 0.6);
        session.last_known_good = Some(good.clone());
        assert_eq!(session.rollback_target(), &good);
    }

    #[test]
    fn test_adjustment_lookup_spans_manual_history() {
        let mut session = session();
        let manual = WaveParameterAdjustment::new(
            AdjustmentType::Manual,
            "operator",
            session.current_settings.clone(),
            session.current_settings.clone().with(WaveParameter::Damping, 0.5),
            Utc::now(),
        );
        let id = manual.id.clone();
        session.manual_history.push(manual);
        assert!(session.adjustment_mut(&id).is_some());
        assert_eq!(session.all_adjustments().len(), 1);
    }

    #[tokio::test]
    async fn test_handle_cancellation_flag() {
        let handle = SessionHandle::new(session());
        assert!(!handle.is_cancelled());
        handle.cancel();
        assert!(handle.is_cancelled());
        assert_eq!(handle.lock().await.status, SessionStatus::Active);
    }
}
