//! Feedback-loop controller.
//!
//! Owns every session, runs the per-point processing cycle and the periodic
//! tick, and broadcasts [`FeedbackEventEnvelope`]s. Sessions are independent:
//! each sits behind its own [`SessionHandle`], so a session waiting on the
//! settings validator never blocks another one.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use comfort_types::{
    AdjustmentType, ComfortDataPoint, ComfortIssue, ComfortValidationThresholds, SessionId,
    SessionStatus, StopReason, StrategyId, WaveMatrixSettings,
};
use dashmap::DashMap;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::adjuster::{
    check_limits, propose_settings, AdjustmentOutcome, AdjustmentRequest, ParameterAdjuster,
    ParameterAdjustmentResult,
};
use crate::clock::{Clock, SystemClock};
use crate::config::ControllerConfig;
use crate::detection::{ComfortValidationResult, IssueDetector};
use crate::effectiveness::{self, EffectivenessUpdate};
use crate::error::{ControllerError, ControllerResult};
use crate::events::{FeedbackEvent, FeedbackEventEnvelope};
use crate::metrics::{FeedbackLoopMetrics, MetricsSnapshot};
use crate::report::FeedbackReport;
use crate::results::{ProcessingResult, StartResult, StatusChangeResult, StopResult, TickReport};
use crate::rollback::{RollbackManager, RollbackResult};
use crate::scoring::{ComfortScorer, NEUTRAL_SCORE};
use crate::session::{FeedbackSession, SessionHandle, SessionSnapshot};
use crate::strategy::StrategyLibrary;
use crate::trend::{ComfortPrediction, ComfortTrend, TrendAnalyzer};
use crate::validator::SettingsValidator;

/// Adaptive comfort controller.
pub struct FeedbackLoopController {
    /// Configuration handed to sessions started from now on.
    config: RwLock<Arc<ControllerConfig>>,

    strategies: RwLock<Arc<StrategyLibrary>>,

    /// Active and paused sessions.
    sessions: DashMap<SessionId, Arc<SessionHandle>>,

    /// Ended sessions, kept for reports.
    archive: DashMap<SessionId, FeedbackSession>,

    /// Serializes the capacity check with the insert.
    start_gate: Mutex<()>,

    adjuster: ParameterAdjuster,
    rollback: RollbackManager,
    clock: Arc<dyn Clock>,
    event_tx: broadcast::Sender<FeedbackEventEnvelope>,
}

impl FeedbackLoopController {
    /// Create a controller with the default strategy library.
    pub fn new(
        config: ControllerConfig,
        validator: Arc<dyn SettingsValidator>,
        clock: Arc<dyn Clock>,
    ) -> ControllerResult<Self> {
        config.validate()?;
        let (event_tx, _) = broadcast::channel(config.event_buffer.max(1));

        Ok(Self {
            config: RwLock::new(Arc::new(config)),
            strategies: RwLock::new(Arc::new(StrategyLibrary::default())),
            sessions: DashMap::new(),
            archive: DashMap::new(),
            start_gate: Mutex::new(()),
            adjuster: ParameterAdjuster::new(validator, clock.clone()),
            rollback: RollbackManager,
            clock,
            event_tx,
        })
    }

    /// Controller driven by the wall clock.
    pub fn with_system_clock(
        config: ControllerConfig,
        validator: Arc<dyn SettingsValidator>,
    ) -> ControllerResult<Self> {
        Self::new(config, validator, Arc::new(SystemClock))
    }

    /// Replace the strategy library at construction.
    pub fn with_strategies(mut self, library: StrategyLibrary) -> Self {
        self.strategies = RwLock::new(Arc::new(library));
        self
    }

    /// Subscribe to controller events.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedbackEventEnvelope> {
        self.event_tx.subscribe()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Number of active or paused sessions.
    pub fn active_session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn active_session_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    fn emit(&self, session_id: &SessionId, event: FeedbackEvent) {
        let envelope = FeedbackEventEnvelope::new(session_id.clone(), event, self.clock.now());
        // No subscribers is not an error
        let _ = self.event_tx.send(envelope);
    }

    // ---- Lifecycle ----

    /// Start a session under a generated id.
    #[instrument(skip(self, initial_settings))]
    pub async fn start_feedback_loop(&self, initial_settings: WaveMatrixSettings) -> StartResult {
        self.start_feedback_loop_with_id(SessionId::generate(), initial_settings)
            .await
    }

    /// Start a session under a caller-chosen id.
    #[instrument(skip(self, initial_settings))]
    pub async fn start_feedback_loop_with_id(
        &self,
        session_id: SessionId,
        initial_settings: WaveMatrixSettings,
    ) -> StartResult {
        let now = self.clock.now();
        match self.try_start(session_id, initial_settings, now).await {
            Ok(id) => StartResult::started(id, now),
            Err(e) => {
                warn!(error = %e, "Failed to start feedback loop");
                StartResult::failed(&e, now)
            }
        }
    }

    async fn try_start(
        &self,
        session_id: SessionId,
        initial_settings: WaveMatrixSettings,
        now: DateTime<Utc>,
    ) -> ControllerResult<SessionId> {
        initial_settings
            .check_finite()
            .map_err(|e| ControllerError::InvalidConfiguration(e.to_string()))?;
        let config = self.config.read().await.clone();

        let _gate = self.start_gate.lock().await;
        if self.sessions.contains_key(&session_id) || self.archive.contains_key(&session_id) {
            return Err(ControllerError::SessionAlreadyExists(session_id));
        }
        if self.sessions.len() >= config.max_active_sessions {
            return Err(ControllerError::CapacityExceeded {
                max: config.max_active_sessions,
            });
        }

        let session = FeedbackSession::start(session_id.clone(), initial_settings.clone(), config, now);
        let handle = SessionHandle::new(session);

        // Hold the session so nothing observes it before its start event
        let guard = handle.lock().await;
        self.sessions.insert(session_id.clone(), handle.clone());
        self.emit(&session_id, FeedbackEvent::SessionStarted { initial_settings });
        drop(guard);

        info!(session_id = %session_id, "Feedback loop started");
        Ok(session_id)
    }

    /// Pause an active session; paused sessions reject data.
    #[instrument(skip(self))]
    pub async fn pause_feedback_loop(&self, session_id: &SessionId) -> StatusChangeResult {
        self.transition(session_id, SessionStatus::Paused, FeedbackEvent::SessionPaused)
            .await
    }

    /// Resume a paused session.
    #[instrument(skip(self))]
    pub async fn resume_feedback_loop(&self, session_id: &SessionId) -> StatusChangeResult {
        self.transition(session_id, SessionStatus::Active, FeedbackEvent::SessionResumed)
            .await
    }

    async fn transition(
        &self,
        session_id: &SessionId,
        next: SessionStatus,
        event: FeedbackEvent,
    ) -> StatusChangeResult {
        let handle = match self.live_handle(session_id) {
            Ok(h) => h,
            Err(e) => return StatusChangeResult::failed(session_id.clone(), &e),
        };
        let mut session = handle.lock().await;
        if handle.is_cancelled() || !session.status.can_transition_to(next) {
            let err = ControllerError::InvalidTransition {
                session_id: session_id.clone(),
                from: session.status,
                to: next,
            };
            return StatusChangeResult::failed(session_id.clone(), &err);
        }

        session.status = next;
        self.emit(session_id, event);
        info!(session_id = %session_id, status = %next, "Session status changed");
        StatusChangeResult::changed(session_id.clone(), next)
    }

    /// Stop a session as completed.
    pub async fn stop_feedback_loop(&self, session_id: &SessionId) -> StopResult {
        self.stop_feedback_loop_with(session_id, StopReason::Completed)
            .await
    }

    /// Stop a session, finalize its pending evaluation and archive it.
    ///
    /// An in-flight adjustment awaiting the validator is discarded.
    #[instrument(skip(self))]
    pub async fn stop_feedback_loop_with(
        &self,
        session_id: &SessionId,
        reason: StopReason,
    ) -> StopResult {
        let now = self.clock.now();
        let Some((_, handle)) = self.sessions.remove(session_id) else {
            let err = ControllerError::SessionNotFound(session_id.clone());
            return StopResult::failed(session_id.clone(), &err, now);
        };

        handle.cancel();
        let mut session = handle.lock().await;

        if let Some(update) = effectiveness::finalize(&mut session) {
            self.emit_effectiveness(session_id, &update);
        }

        let status = reason.terminal_status();
        session.status = status;
        session.ended_at = Some(now);
        session.stop_reason = Some(reason);

        let metrics = session.metrics.snapshot();
        self.emit(
            session_id,
            FeedbackEvent::SessionStopped {
                status,
                metrics: Box::new(metrics.clone()),
            },
        );
        self.archive.insert(session_id.clone(), session.clone());

        info!(
            session_id = %session_id,
            status = %status,
            data_points = metrics.counters.data_points_processed,
            adjustments = metrics.counters.adjustments_succeeded,
            rollbacks = metrics.counters.rollbacks,
            "Feedback loop stopped"
        );

        StopResult {
            session_id: session_id.clone(),
            is_successful: true,
            status: Some(status),
            metrics: Some(metrics),
            messages: vec![format!("session {}", status)],
            timestamp: now,
        }
    }

    /// Handle of a live (active or paused) session.
    fn live_handle(&self, session_id: &SessionId) -> ControllerResult<Arc<SessionHandle>> {
        if let Some(handle) = self.sessions.get(session_id) {
            return Ok(handle.value().clone());
        }
        match self.archive.get(session_id) {
            Some(ended) => Err(ControllerError::SessionNotActive {
                session_id: session_id.clone(),
                status: ended.status,
            }),
            None => Err(ControllerError::SessionNotFound(session_id.clone())),
        }
    }

    // ---- Processing ----

    /// Run one processing cycle for a new data point.
    ///
    /// Scores the point, updates the trend, validates against the session's
    /// thresholds, then either rolls back (safety-critical) or attempts one
    /// bounded adjustment.
    #[instrument(skip(self, point))]
    pub async fn process_comfort_data(
        &self,
        session_id: &SessionId,
        point: ComfortDataPoint,
    ) -> ProcessingResult {
        let handle = match self.live_handle(session_id) {
            Ok(h) => h,
            Err(e) => return ProcessingResult::failed(session_id.clone(), &e, self.clock.now()),
        };
        let mut session = handle.lock().await;

        if let Err(e) = ensure_active(&handle, &session) {
            return ProcessingResult::failed(session_id.clone(), &e, self.clock.now());
        }
        if let Err(e) = check_data_point(&session, &point) {
            session.metrics.data_points_rejected += 1;
            warn!(session_id = %session_id, error = %e, "Data point rejected");
            return ProcessingResult::failed(session_id.clone(), &e, self.clock.now());
        }

        self.run_cycle(&handle, &mut session, point).await
    }

    async fn run_cycle(
        &self,
        handle: &SessionHandle,
        session: &mut FeedbackSession,
        point: ComfortDataPoint,
    ) -> ProcessingResult {
        let now = self.clock.now();
        let config = session.config.clone();
        let analyzer = TrendAnalyzer::new(config.trend.clone());

        let score = ComfortScorer::new(config.scoring.clone()).score(&point);
        session.window.push(score.score, point.timestamp);
        session.comfort_history.push(point);
        session.metrics.record_score(score.score);
        session.latest_score = Some(score.clone());

        let trend = analyzer.analyze(&session.window);
        let prediction = analyzer.predict(&session.window);
        let validation = IssueDetector::new(config.predictive_adjustments).evaluate(
            session.id.clone(),
            &score,
            &session.thresholds,
            Some(&prediction),
            now,
        );
        session
            .metrics
            .record_validation(validation.is_valid, validation.issues.len());
        session.current_issues = validation.issues.clone();

        // Settings live during a safety breach never become last-known-good
        let safety_critical = validation.is_safety_critical(&session.thresholds);
        let mut effectiveness = if safety_critical {
            effectiveness::observe_critical(session, score.score)
        } else {
            effectiveness::observe(session, score.score)
        };
        if let Some(update) = &effectiveness {
            self.emit_effectiveness(&session.id, update);
        }

        debug!(
            session_id = %session.id,
            score = score.score,
            trend = %trend.direction,
            valid = validation.is_valid,
            issues = validation.issues.len(),
            "Comfort data processed"
        );

        let boxed = Box::new(validation.clone());
        self.emit(
            &session.id,
            if validation.is_valid {
                FeedbackEvent::ValidationPassed { result: boxed }
            } else {
                FeedbackEvent::ValidationFailed { result: boxed }
            },
        );

        let mut messages = validation.messages.clone();
        let mut adjustment = None;
        let mut rollback = None;

        if safety_critical {
            let reason = rollback_reason(&validation, &session.thresholds);
            session.last_rollback_point = Some(score.data_point.clone());
            let result = self.rollback_and_emit(
                session,
                AdjustmentType::Rollback,
                reason,
                validation.issues.clone(),
                now,
            );
            messages.extend(result.messages.iter().cloned());
            rollback = Some(result);
        } else if has_actionable_issues(session) {
            let result = self.adjust_automatically(handle, session, None).await;
            messages.extend(result.messages.iter().cloned());
            rollback = result.rollback.clone();
            if effectiveness.is_none() {
                effectiveness = result.superseded.clone();
            }
            adjustment = Some(result);
        }

        ProcessingResult {
            session_id: session.id.clone(),
            is_successful: true,
            score: Some(score),
            trend: Some(trend),
            prediction: Some(prediction),
            validation: Some(validation),
            adjustment,
            rollback,
            effectiveness,
            messages,
            timestamp: now,
        }
    }

    /// One automatic adjustment attempt from the session's current issues.
    ///
    /// With `strategy_id` the named strategy is used instead of selection.
    /// A rollback forced by exhausting the failure allowance is attached to
    /// the result.
    async fn adjust_automatically(
        &self,
        handle: &SessionHandle,
        session: &mut FeedbackSession,
        strategy_id: Option<StrategyId>,
    ) -> ParameterAdjustmentResult {
        let now = self.clock.now();

        if let Err((outcome, message)) = check_limits(session, now) {
            session.metrics.policy_rejections += 1;
            debug!(session_id = %session.id, outcome = ?outcome, "Adjustment refused by policy");
            let result = ParameterAdjustmentResult::refused(session.id.clone(), outcome, message, now);
            self.emit_adjustment(&session.id, &result);
            return result;
        }

        let min_severity = session.config.limits.min_issue_severity;
        let issues: Vec<ComfortIssue> = session
            .current_issues
            .iter()
            .filter(|i| i.severity >= min_severity)
            .cloned()
            .collect();

        if strategy_id.is_none() && issues.is_empty() {
            let result = ParameterAdjustmentResult::refused(
                session.id.clone(),
                AdjustmentOutcome::NoIssues,
                "no actionable comfort issues",
                now,
            );
            return result;
        }

        let library = self.strategies.read().await.clone();
        let strategy = match &strategy_id {
            Some(id) => library.get(id).filter(|s| s.enabled),
            None => library.select(&issues),
        };
        let Some(strategy) = strategy else {
            let message = match &strategy_id {
                Some(id) => format!("{} is unknown or disabled", id),
                None => "no enabled strategy addresses the detected issues".to_string(),
            };
            let mut result = ParameterAdjustmentResult::refused(
                session.id.clone(),
                AdjustmentOutcome::NoStrategy,
                message,
                now,
            );
            result.strategy = strategy_id;
            self.emit_adjustment(&session.id, &result);
            return result;
        };

        let severity = issues
            .iter()
            .filter(|i| strategy.addresses(i.issue_type))
            .map(|i| i.severity)
            .max()
            .unwrap_or(min_severity);
        let candidate = propose_settings(
            strategy,
            &session.current_settings,
            severity,
            &session.config.parameter_ranges,
            session.config.limits.max_parameter_change_per_adjustment,
        );
        let triggering: Vec<ComfortIssue> = issues
            .into_iter()
            .filter(|i| strategy.addresses(i.issue_type))
            .collect();

        let request = AdjustmentRequest::from_strategy(strategy, candidate, triggering);
        let mut result = self.adjuster.submit(handle, session, request).await;
        self.after_submit(session, &mut result);
        result
    }

    fn emit_effectiveness(&self, session_id: &SessionId, update: &EffectivenessUpdate) {
        self.emit(
            session_id,
            FeedbackEvent::EffectivenessRecorded {
                update: update.clone(),
            },
        );
    }

    fn emit_adjustment(&self, session_id: &SessionId, result: &ParameterAdjustmentResult) {
        let boxed = Box::new(result.clone());
        let event = match result.outcome {
            AdjustmentOutcome::Committed => FeedbackEvent::ParametersAdjusted { result: boxed },
            AdjustmentOutcome::Cancelled | AdjustmentOutcome::NoIssues => return,
            _ => FeedbackEvent::AdjustmentRejected { result: boxed },
        };
        self.emit(session_id, event);
    }

    /// Publish a submission outcome and roll back after too many failures.
    fn after_submit(&self, session: &mut FeedbackSession, result: &mut ParameterAdjustmentResult) {
        if let Some(update) = &result.superseded {
            self.emit_effectiveness(&session.id, update);
        }
        self.emit_adjustment(&session.id, result);

        let allowance = session.config.limits.max_consecutive_failed_adjustments;
        if !result.outcome.is_failure() || session.consecutive_failures < allowance {
            return;
        }
        let reason = format!(
            "{} consecutive adjustment failures",
            session.consecutive_failures
        );
        let issues = session.current_issues.clone();
        let forced = self.rollback_and_emit(
            session,
            AdjustmentType::Rollback,
            reason,
            issues,
            result.timestamp,
        );
        result.messages.extend(forced.messages.iter().cloned());
        result.rollback = Some(forced);
    }

    fn rollback_and_emit(
        &self,
        session: &mut FeedbackSession,
        kind: AdjustmentType,
        reason: String,
        issues: Vec<ComfortIssue>,
        at: DateTime<Utc>,
    ) -> RollbackResult {
        let result = self.rollback.rollback(session, kind, reason, issues, at);
        self.emit(
            &session.id,
            FeedbackEvent::AutomaticRollbackTriggered {
                result: Box::new(result.clone()),
            },
        );
        result
    }

    // ---- Adjustments ----

    /// Attempt one automatic adjustment from the session's current issues.
    ///
    /// `strategy` forces a specific strategy instead of priority selection;
    /// the policy gates still apply.
    #[instrument(skip(self))]
    pub async fn apply_automatic_adjustments(
        &self,
        session_id: &SessionId,
        strategy: Option<StrategyId>,
    ) -> ParameterAdjustmentResult {
        let handle = match self.live_handle(session_id) {
            Ok(h) => h,
            Err(e) => return self.refused_for(session_id, &e),
        };
        let mut session = handle.lock().await;
        if let Err(e) = ensure_active(&handle, &session) {
            return self.refused_for(session_id, &e);
        }
        self.adjust_automatically(&handle, &mut session, strategy).await
    }

    /// Apply host-chosen settings.
    ///
    /// Manual adjustments skip the budget and rate limit but are still
    /// validated by the settings validator.
    #[instrument(skip(self, settings))]
    pub async fn apply_manual_adjustments(
        &self,
        session_id: &SessionId,
        settings: WaveMatrixSettings,
        reason: &str,
    ) -> ParameterAdjustmentResult {
        let handle = match self.live_handle(session_id) {
            Ok(h) => h,
            Err(e) => return self.refused_for(session_id, &e),
        };
        let mut session = handle.lock().await;
        if let Err(e) = ensure_active(&handle, &session) {
            return self.refused_for(session_id, &e);
        }
        if let Err(e) = settings.check_finite() {
            return ParameterAdjustmentResult::refused(
                session_id.clone(),
                AdjustmentOutcome::RejectedByValidator,
                e.to_string(),
                self.clock.now(),
            );
        }

        let request = AdjustmentRequest::manual(settings, reason);
        let mut result = self.adjuster.submit(&handle, &mut session, request).await;
        self.after_submit(&mut session, &mut result);
        result
    }

    fn refused_for(&self, session_id: &SessionId, err: &ControllerError) -> ParameterAdjustmentResult {
        let now = self.clock.now();
        match err {
            ControllerError::SessionNotFound(_) => {
                ParameterAdjustmentResult::session_not_found(session_id.clone(), now)
            }
            other => ParameterAdjustmentResult::refused(
                session_id.clone(),
                AdjustmentOutcome::SessionNotActive,
                other.to_string(),
                now,
            ),
        }
    }

    /// Roll the session back as the controller would.
    #[instrument(skip(self))]
    pub async fn trigger_automatic_rollback(
        &self,
        session_id: &SessionId,
        reason: &str,
    ) -> RollbackResult {
        self.requested_rollback(session_id, AdjustmentType::Rollback, reason)
            .await
    }

    /// Host-requested emergency rollback.
    #[instrument(skip(self))]
    pub async fn trigger_emergency_rollback(
        &self,
        session_id: &SessionId,
        reason: &str,
    ) -> RollbackResult {
        self.requested_rollback(session_id, AdjustmentType::Emergency, reason)
            .await
    }

    async fn requested_rollback(
        &self,
        session_id: &SessionId,
        kind: AdjustmentType,
        reason: &str,
    ) -> RollbackResult {
        let now = self.clock.now();
        let handle = match self.live_handle(session_id) {
            Ok(h) => h,
            Err(e) => {
                let mut result = RollbackResult::session_not_found(session_id.clone(), reason.to_string(), now);
                result.messages = vec![e.to_string()];
                return result;
            }
        };
        let mut session = handle.lock().await;
        if handle.is_cancelled() {
            return RollbackResult::session_not_found(session_id.clone(), reason.to_string(), now);
        }
        let issues = session.current_issues.clone();
        self.rollback_and_emit(&mut session, kind, reason.to_string(), issues, now)
    }

    // ---- Queries ----

    /// Run `f` on a live or archived session.
    async fn read_session<T>(
        &self,
        session_id: &SessionId,
        f: impl FnOnce(&FeedbackSession) -> T,
    ) -> ControllerResult<T> {
        let live = self.sessions.get(session_id).map(|h| h.value().clone());
        if let Some(handle) = live {
            let session = handle.lock().await;
            return Ok(f(&session));
        }
        match self.archive.get(session_id) {
            Some(session) => Ok(f(session.value())),
            None => Err(ControllerError::SessionNotFound(session_id.clone())),
        }
    }

    /// Re-validate the latest score without side effects.
    #[instrument(skip(self))]
    pub async fn validate_comfort_levels(&self, session_id: &SessionId) -> ComfortValidationResult {
        let now = self.clock.now();
        self.read_session(session_id, |session| evaluate_session(session, now))
            .await
            .unwrap_or_else(|_| ComfortValidationResult::session_not_found(session_id.clone(), now))
    }

    pub async fn analyze_trend(&self, session_id: &SessionId) -> ControllerResult<ComfortTrend> {
        self.read_session(session_id, |s| s.trend()).await
    }

    pub async fn predict_trajectory(
        &self,
        session_id: &SessionId,
    ) -> ControllerResult<ComfortPrediction> {
        self.read_session(session_id, |s| {
            TrendAnalyzer::new(s.config.trend.clone()).predict(&s.window)
        })
        .await
    }

    pub async fn metrics(&self, session_id: &SessionId) -> ControllerResult<MetricsSnapshot> {
        self.read_session(session_id, |s| s.metrics.snapshot()).await
    }

    /// Metrics summed over every live and archived session.
    pub async fn aggregate_metrics(&self) -> MetricsSnapshot {
        let mut total = FeedbackLoopMetrics::new();
        let handles: Vec<Arc<SessionHandle>> =
            self.sessions.iter().map(|e| e.value().clone()).collect();
        for handle in handles {
            total.merge(&handle.lock().await.metrics);
        }
        for session in self.archive.iter() {
            total.merge(&session.metrics);
        }
        total.snapshot()
    }

    pub async fn session_snapshot(&self, session_id: &SessionId) -> ControllerResult<SessionSnapshot> {
        self.read_session(session_id, |s| s.snapshot()).await
    }

    /// Effectiveness report for a live or ended session.
    pub async fn feedback_report(&self, session_id: &SessionId) -> ControllerResult<FeedbackReport> {
        let now = self.clock.now();
        self.read_session(session_id, |s| FeedbackReport::build(s, now))
            .await
    }

    // ---- Configuration ----

    pub async fn config(&self) -> Arc<ControllerConfig> {
        self.config.read().await.clone()
    }

    /// Replace the configuration used by sessions started afterwards.
    ///
    /// Running sessions keep the configuration they started with. The event
    /// buffer size is fixed at construction.
    #[instrument(skip(self, config))]
    pub async fn update_config(&self, config: ControllerConfig) -> ControllerResult<()> {
        config.validate()?;
        *self.config.write().await = Arc::new(config);
        info!("Controller configuration updated");
        Ok(())
    }

    /// Change a live session's thresholds for its future evaluations.
    #[instrument(skip(self, thresholds))]
    pub async fn reconfigure_session_thresholds(
        &self,
        session_id: &SessionId,
        thresholds: ComfortValidationThresholds,
    ) -> ControllerResult<()> {
        thresholds
            .validate()
            .map_err(|e| ControllerError::InvalidConfiguration(e.to_string()))?;
        let handle = self.live_handle(session_id)?;
        let mut session = handle.lock().await;
        session.thresholds = thresholds;
        info!(session_id = %session_id, "Session thresholds reconfigured");
        Ok(())
    }

    pub async fn strategies(&self) -> Arc<StrategyLibrary> {
        self.strategies.read().await.clone()
    }

    /// Replace the strategy library for every later selection.
    pub async fn set_strategies(&self, library: StrategyLibrary) {
        let count = library.len();
        *self.strategies.write().await = Arc::new(library);
        info!(strategies = count, "Strategy library replaced");
    }

    // ---- Periodic work ----

    /// Periodic re-evaluation of every active session.
    ///
    /// Finalizes effectiveness evaluations that have waited long enough and
    /// rolls back sessions whose latest score has become safety-critical
    /// (after a threshold change) without having triggered a rollback yet.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        let handles: Vec<Arc<SessionHandle>> =
            self.sessions.iter().map(|e| e.value().clone()).collect();

        for handle in handles {
            let mut session = handle.lock().await;
            if handle.is_cancelled() || !session.status.is_active() {
                continue;
            }
            report.sessions_evaluated += 1;
            let now = self.clock.now();

            if evaluation_due(&session, now) {
                if let Some(update) = effectiveness::finalize(&mut session) {
                    self.emit_effectiveness(&session.id, &update);
                    report.effectiveness.push(update);
                }
            }

            let Some(score) = session.latest_score.clone() else {
                continue;
            };
            if session.last_rollback_point.as_ref() == Some(&score.data_point) {
                continue;
            }
            let validation = IssueDetector::new(false).evaluate(
                session.id.clone(),
                &score,
                &session.thresholds,
                None,
                now,
            );
            if validation.is_safety_critical(&session.thresholds) {
                let reason = rollback_reason(&validation, &session.thresholds);
                session.last_rollback_point = Some(score.data_point.clone());
                let result = self.rollback_and_emit(
                    &mut session,
                    AdjustmentType::Rollback,
                    reason,
                    validation.issues,
                    now,
                );
                report.rollbacks.push(result);
            }
        }

        if !report.rollbacks.is_empty() || !report.effectiveness.is_empty() {
            debug!(
                sessions = report.sessions_evaluated,
                rollbacks = report.rollbacks.len(),
                evaluations = report.effectiveness.len(),
                "Tick completed"
            );
        }
        report
    }
}

fn ensure_active(handle: &SessionHandle, session: &FeedbackSession) -> ControllerResult<()> {
    if handle.is_cancelled() || !session.status.is_active() {
        return Err(ControllerError::SessionNotActive {
            session_id: session.id.clone(),
            status: session.status,
        });
    }
    Ok(())
}

fn check_data_point(session: &FeedbackSession, point: &ComfortDataPoint) -> ControllerResult<()> {
    if !point.readings.all_finite() {
        return Err(ControllerError::InvalidDataPoint(
            "reading is not a finite number".to_string(),
        ));
    }
    if !point.quality.is_finite() {
        return Err(ControllerError::InvalidDataPoint(
            "quality is not a finite number".to_string(),
        ));
    }
    if let Some(last) = session.last_data_at() {
        if point.timestamp < last {
            return Err(ControllerError::InvalidDataPoint(format!(
                "timestamp {} precedes last accepted {}",
                point.timestamp, last
            )));
        }
    }
    Ok(())
}

fn has_actionable_issues(session: &FeedbackSession) -> bool {
    let min = session.config.limits.min_issue_severity;
    session.current_issues.iter().any(|i| i.severity >= min)
}

fn evaluation_due(session: &FeedbackSession, now: DateTime<Utc>) -> bool {
    let Some(pending) = &session.pending_evaluation else {
        return false;
    };
    if pending.samples.is_empty() {
        return false;
    }
    let window = u32::try_from(session.config.effectiveness.evaluation_window).unwrap_or(u32::MAX);
    let due = session.config.tick_interval.saturating_mul(window);
    let elapsed = now
        .signed_duration_since(pending.committed_at)
        .to_std()
        .unwrap_or_default();
    elapsed >= due
}

fn evaluate_session(session: &FeedbackSession, now: DateTime<Utc>) -> ComfortValidationResult {
    let Some(score) = &session.latest_score else {
        return ComfortValidationResult::no_data(session.id.clone(), NEUTRAL_SCORE, now);
    };
    let prediction = TrendAnalyzer::new(session.config.trend.clone()).predict(&session.window);
    IssueDetector::new(session.config.predictive_adjustments).evaluate(
        session.id.clone(),
        score,
        &session.thresholds,
        Some(&prediction),
        now,
    )
}

fn rollback_reason(
    validation: &ComfortValidationResult,
    thresholds: &ComfortValidationThresholds,
) -> String {
    if validation.overall_comfort_score <= thresholds.critical_comfort_score {
        return format!(
            "comfort score {:.1} at or below critical {:.1}",
            validation.overall_comfort_score, thresholds.critical_comfort_score
        );
    }
    let critical: Vec<String> = validation
        .issues
        .iter()
        .filter(|i| i.is_critical())
        .map(|i| i.issue_type.to_string())
        .collect();
    format!("critical comfort issue: {}", critical.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use comfort_types::{ComfortReadings, MeasurementMethod};

    use crate::clock::ManualClock;
    use crate::validator::PermissiveSettingsValidator;

    fn controller() -> (FeedbackLoopController, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let controller = FeedbackLoopController::new(
            ControllerConfig::default(),
            Arc::new(PermissiveSettingsValidator),
            clock.clone(),
        )
        .unwrap();
        (controller, clock)
    }

    fn point(clock: &ManualClock, overall: f64) -> ComfortDataPoint {
        ComfortDataPoint::new(
            clock.now(),
            MeasurementMethod::Questionnaire,
            ComfortReadings::overall(overall),
        )
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let (controller, _) = controller();
        let started = controller
            .start_feedback_loop(WaveMatrixSettings::default())
            .await;
        assert!(started.is_successful);
        let id = started.session_id.unwrap();
        assert_eq!(controller.active_session_count(), 1);

        let stopped = controller.stop_feedback_loop(&id).await;
        assert!(stopped.is_successful);
        assert_eq!(stopped.status, Some(SessionStatus::Completed));
        assert_eq!(controller.active_session_count(), 0);

        let again = controller.stop_feedback_loop(&id).await;
        assert!(!again.is_successful);
        assert_eq!(again.messages, vec!["Session not found".to_string()]);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let (controller, _) = controller();
        let id = SessionId::generate();
        assert!(
            controller
                .start_feedback_loop_with_id(id.clone(), WaveMatrixSettings::default())
                .await
                .is_successful
        );
        let second = controller
            .start_feedback_loop_with_id(id, WaveMatrixSettings::default())
            .await;
        assert!(!second.is_successful);
    }

    #[tokio::test]
    async fn test_out_of_order_point_rejected() {
        let (controller, clock) = controller();
        let id = controller
            .start_feedback_loop(WaveMatrixSettings::default())
            .await
            .session_id
            .unwrap();

        let early = point(&clock, 80.0);
        clock.advance(Duration::from_secs(5));
        assert!(controller.process_comfort_data(&id, point(&clock, 80.0)).await.is_successful);

        let result = controller.process_comfort_data(&id, early).await;
        assert!(!result.is_successful);
        let metrics = controller.metrics(&id).await.unwrap();
        assert_eq!(metrics.counters.data_points_rejected, 1);
        assert_eq!(metrics.counters.data_points_processed, 1);
    }

    #[tokio::test]
    async fn test_validate_without_data_is_neutral() {
        let (controller, _) = controller();
        let id = controller
            .start_feedback_loop(WaveMatrixSettings::default())
            .await
            .session_id
            .unwrap();
        let result = controller.validate_comfort_levels(&id).await;
        assert!(result.is_valid);
        assert_eq!(result.overall_comfort_score, NEUTRAL_SCORE);

        let missing = controller
            .validate_comfort_levels(&SessionId::generate())
            .await;
        assert!(!missing.is_valid);
    }

    #[tokio::test]
    async fn test_threshold_change_rolls_back_on_tick() {
        let (controller, clock) = controller();
        let id = controller
            .start_feedback_loop(WaveMatrixSettings::default())
            .await
            .session_id
            .unwrap();
        let result = controller.process_comfort_data(&id, point(&clock, 75.0)).await;
        assert!(!result.rolled_back());

        let mut strict = ComfortValidationThresholds::default();
        strict.minimum_comfort_score = 90.0;
        strict.critical_comfort_score = 80.0;
        strict.target_comfort_score = 95.0;
        controller
            .reconfigure_session_thresholds(&id, strict)
            .await
            .unwrap();

        let report = controller.tick().await;
        assert_eq!(report.sessions_evaluated, 1);
        assert_eq!(report.rollbacks.len(), 1);

        // Same point does not trigger twice
        assert!(controller.tick().await.rollbacks.is_empty());
    }
}
