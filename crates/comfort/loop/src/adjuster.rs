//! Bounded parameter adjustment.
//!
//! Automatic adjustments pass three policy gates (enabled, budget, rate),
//! turn a strategy's rules into a candidate capped per parameter, and commit
//! only if the external settings validator accepts the candidate. Manual
//! adjustments skip the gates and strategy selection but not validation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use comfort_types::{
    AdjustmentStrategy, AdjustmentType, ComfortIssue, IssueSeverity, ParameterRanges, RuleAction,
    SessionId, StrategyId, WaveMatrixSettings, WaveParameterAdjustment,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::effectiveness::{self, EffectivenessUpdate};
use crate::rollback::RollbackResult;
use crate::session::{FeedbackSession, PendingEvaluation, SessionHandle};
use crate::validator::SettingsValidator;

/// What happened to an adjustment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjustmentOutcome {
    Committed,
    /// Automatic adjustments are disabled in configuration.
    Disabled,
    /// The session's adjustment budget is used up.
    BudgetExhausted,
    /// Too soon after the previous adjustment.
    RateLimited,
    /// Nothing to address.
    NoIssues,
    /// No enabled strategy addresses the detected issues.
    NoStrategy,
    /// The candidate equals the current settings.
    NoChange,
    RejectedByValidator,
    ValidatorError,
    /// The session was stopped while the candidate was being validated.
    Cancelled,
    SessionNotFound,
    SessionNotActive,
}

impl AdjustmentOutcome {
    /// Refused by a configured limit rather than by the validator.
    pub fn is_policy_rejection(&self) -> bool {
        matches!(
            self,
            AdjustmentOutcome::Disabled
                | AdjustmentOutcome::BudgetExhausted
                | AdjustmentOutcome::RateLimited
        )
    }

    /// Counted as a failed adjustment.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            AdjustmentOutcome::RejectedByValidator | AdjustmentOutcome::ValidatorError
        )
    }
}

/// Outcome of an adjustment request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterAdjustmentResult {
    pub session_id: SessionId,
    pub is_successful: bool,
    pub outcome: AdjustmentOutcome,

    /// Committed record, when successful.
    pub adjustment: Option<WaveParameterAdjustment>,

    pub strategy: Option<StrategyId>,

    /// Candidate submitted to the validator, if any.
    pub candidate: Option<WaveMatrixSettings>,

    pub validator_reasons: Vec<String>,

    /// Previous adjustment's evaluation, cut short by this commit.
    pub superseded: Option<EffectivenessUpdate>,

    /// Rollback forced by this attempt exhausting the failure allowance.
    pub rollback: Option<RollbackResult>,

    pub messages: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl ParameterAdjustmentResult {
    /// Unsuccessful result that never reached the validator.
    pub fn refused(
        session_id: SessionId,
        outcome: AdjustmentOutcome,
        message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            is_successful: false,
            outcome,
            adjustment: None,
            strategy: None,
            candidate: None,
            validator_reasons: Vec::new(),
            superseded: None,
            rollback: None,
            messages: vec![message.into()],
            timestamp: at,
        }
    }

    pub fn session_not_found(session_id: SessionId, at: DateTime<Utc>) -> Self {
        Self::refused(session_id, AdjustmentOutcome::SessionNotFound, "Session not found", at)
    }

    fn with_strategy(mut self, strategy: Option<StrategyId>) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Check the automatic-adjustment gates for a session.
pub fn check_limits(
    session: &FeedbackSession,
    now: DateTime<Utc>,
) -> Result<(), (AdjustmentOutcome, String)> {
    let limits = &session.config.limits;

    if !limits.enable_automatic_adjustments {
        return Err((
            AdjustmentOutcome::Disabled,
            "automatic adjustments are disabled".to_string(),
        ));
    }

    if session.adjustment_history.len() >= limits.max_adjustments_per_session {
        return Err((
            AdjustmentOutcome::BudgetExhausted,
            format!(
                "maximum of {} adjustments per session reached",
                limits.max_adjustments_per_session
            ),
        ));
    }

    if let Some(last) = session.last_adjustment_at() {
        let elapsed = now.signed_duration_since(last);
        let min_gap = chrono::Duration::from_std(limits.min_time_between_adjustments)
            .unwrap_or(chrono::Duration::MAX);
        if elapsed < min_gap {
            return Err((
                AdjustmentOutcome::RateLimited,
                format!(
                    "last adjustment {}s ago, minimum interval {}s",
                    elapsed.num_seconds(),
                    min_gap.num_seconds()
                ),
            ));
        }
    }

    Ok(())
}

/// Build a candidate from a strategy's rules.
///
/// Rules apply in order; severity-scaled rules are stretched by the
/// severity's scale factor. Each parameter's total change is then capped at
/// `max_change` times its range span and clamped into range. Without a range
/// the cap is `max_change` times its magnitude, but never below `max_change`
/// itself so a parameter at zero can still move. Parameters missing from
/// `current` are left alone.
pub fn propose_settings(
    strategy: &AdjustmentStrategy,
    current: &WaveMatrixSettings,
    severity: IssueSeverity,
    ranges: &ParameterRanges,
    max_change: f64,
) -> WaveMatrixSettings {
    let factor = severity.scale_factor();
    let mut candidate = current.clone();

    for rule in &strategy.rules {
        let Some(value) = candidate.get(rule.parameter) else {
            continue;
        };
        let k = if rule.scale_with_severity { factor } else { 1.0 };
        let proposed = match rule.action {
            RuleAction::Offset(delta) => value + delta * k,
            RuleAction::Scale(scale) => value * (1.0 + (scale - 1.0) * k),
            RuleAction::SetTo(target) => target,
        };
        if proposed.is_finite() {
            candidate.set(rule.parameter, proposed);
        }
    }

    for (parameter, before) in current.iter() {
        let Some(after) = candidate.get(parameter) else {
            continue;
        };
        let range = ranges.get(parameter);
        let cap = match range {
            Some(r) => max_change * r.span(),
            None => max_change * before.abs().max(1.0),
        };
        let mut capped = before + (after - before).clamp(-cap, cap);
        if let Some(r) = range {
            capped = r.clamp(capped);
        }
        candidate.set(parameter, capped);
    }

    candidate
}

/// Candidate plus the context to record with it.
#[derive(Debug, Clone)]
pub struct AdjustmentRequest {
    pub adjustment_type: AdjustmentType,
    pub reason: String,
    pub candidate: WaveMatrixSettings,
    pub issues: Vec<ComfortIssue>,
    pub strategy: Option<StrategyId>,
}

impl AdjustmentRequest {
    /// Automatic request from a strategy.
    pub fn from_strategy(
        strategy: &AdjustmentStrategy,
        candidate: WaveMatrixSettings,
        issues: Vec<ComfortIssue>,
    ) -> Self {
        Self {
            adjustment_type: AdjustmentType::Automatic,
            reason: format!("strategy {}", strategy.name),
            candidate,
            issues,
            strategy: Some(strategy.id.clone()),
        }
    }

    pub fn manual(candidate: WaveMatrixSettings, reason: impl Into<String>) -> Self {
        Self {
            adjustment_type: AdjustmentType::Manual,
            reason: reason.into(),
            candidate,
            issues: Vec::new(),
            strategy: None,
        }
    }
}

/// Validate-then-commit executor.
pub struct ParameterAdjuster {
    validator: Arc<dyn SettingsValidator>,
    clock: Arc<dyn Clock>,
}

impl ParameterAdjuster {
    pub fn new(validator: Arc<dyn SettingsValidator>, clock: Arc<dyn Clock>) -> Self {
        Self { validator, clock }
    }

    /// Submit a candidate to the validator and commit it if accepted.
    ///
    /// The session stays locked across the validator call; if the session was
    /// cancelled meanwhile the verdict is discarded.
    pub async fn submit(
        &self,
        handle: &SessionHandle,
        session: &mut FeedbackSession,
        request: AdjustmentRequest,
    ) -> ParameterAdjustmentResult {
        let session_id = session.id.clone();

        if request.candidate == session.current_settings {
            return ParameterAdjustmentResult::refused(
                session_id,
                AdjustmentOutcome::NoChange,
                "candidate equals current settings",
                self.clock.now(),
            )
            .with_strategy(request.strategy);
        }

        let verdict = self.validator.validate(&request.candidate).await;
        let now = self.clock.now();

        if handle.is_cancelled() {
            debug!(session_id = %session_id, "Discarding adjustment validated after stop");
            let mut result = ParameterAdjustmentResult::refused(
                session_id,
                AdjustmentOutcome::Cancelled,
                "session stopped during validation",
                now,
            )
            .with_strategy(request.strategy);
            result.candidate = Some(request.candidate);
            return result;
        }

        let (outcome, reasons) = match verdict {
            Ok(v) if v.valid => (AdjustmentOutcome::Committed, v.reasons),
            Ok(v) => (AdjustmentOutcome::RejectedByValidator, v.reasons),
            Err(e) => (AdjustmentOutcome::ValidatorError, vec![e.to_string()]),
        };

        if outcome != AdjustmentOutcome::Committed {
            session.metrics.record_adjustment(false);
            session.consecutive_failures += 1;
            warn!(
                session_id = %session_id,
                outcome = ?outcome,
                consecutive_failures = session.consecutive_failures,
                reasons = ?reasons,
                "Adjustment rejected"
            );
            return ParameterAdjustmentResult {
                session_id,
                is_successful: false,
                outcome,
                adjustment: None,
                strategy: request.strategy,
                candidate: Some(request.candidate),
                messages: vec![format!("{} rejected by settings validator", request.adjustment_type)],
                validator_reasons: reasons,
                superseded: None,
                rollback: None,
                timestamp: now,
            };
        }

        // The previous adjustment is measured with what it got
        let superseded = effectiveness::finalize(session);

        let mut adjustment = WaveParameterAdjustment::new(
            request.adjustment_type,
            request.reason,
            session.current_settings.clone(),
            request.candidate.clone(),
            now,
        )
        .with_issues(request.issues);
        if let Some(strategy) = &request.strategy {
            adjustment = adjustment.with_strategy(strategy.clone());
        }
        let baseline = session.latest_score.as_ref().map(|s| s.score);
        if let Some(baseline) = baseline {
            adjustment = adjustment.with_baseline_score(baseline);
            session.pending_evaluation = Some(PendingEvaluation {
                adjustment_id: adjustment.id.clone(),
                committed_at: now,
                baseline,
                samples: Vec::new(),
            });
        }

        session.current_settings = request.candidate.clone();
        session.consecutive_failures = 0;
        session.metrics.record_adjustment(true);
        match request.adjustment_type {
            AdjustmentType::Automatic => session.adjustment_history.push(adjustment.clone()),
            _ => session.manual_history.push(adjustment.clone()),
        }

        info!(
            session_id = %session_id,
            adjustment_id = %adjustment.id,
            kind = %adjustment.adjustment_type,
            strategy = ?request.strategy,
            changes = adjustment.settings_before.diff(&adjustment.settings_after).len(),
            "Adjustment committed"
        );

        ParameterAdjustmentResult {
            session_id,
            is_successful: true,
            outcome,
            strategy: request.strategy,
            candidate: Some(request.candidate),
            messages: vec![adjustment.reason.clone()],
            adjustment: Some(adjustment),
            validator_reasons: reasons,
            superseded,
            rollback: None,
            timestamp: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use comfort_types::{AdjustmentRule, IssueType, WaveParameter};

    use crate::clock::ManualClock;
    use crate::config::ControllerConfig;
    use crate::validator::{PermissiveSettingsValidator, RejectingSettingsValidator};

    fn session_with(config: ControllerConfig) -> FeedbackSession {
        FeedbackSession::start(
            SessionId::generate(),
            WaveMatrixSettings::default(),
            Arc::new(config),
            Utc::now(),
        )
    }

    fn slow_down() -> AdjustmentStrategy {
        AdjustmentStrategy::new("slow", "Slow down", 10)
            .addressing(IssueType::MotionSickness)
            .with_rule(AdjustmentRule::new(WaveParameter::Speed, RuleAction::Offset(-2.0)))
    }

    #[test]
    fn test_candidate_capped_by_range_fraction() {
        let ranges = ParameterRanges::default();
        let current = WaveMatrixSettings::default();
        let candidate = propose_settings(&slow_down(), &current, IssueSeverity::Medium, &ranges, 0.2);

        // speed range 0.1-3.0: span 2.9, cap 0.58
        let speed = candidate.get(WaveParameter::Speed).unwrap();
        assert!((speed - (1.0 - 0.58)).abs() < 1e-9);
        assert_eq!(candidate.get(WaveParameter::Amplitude), current.get(WaveParameter::Amplitude));
    }

    #[test]
    fn test_candidate_clamped_into_range() {
        let strategy = AdjustmentStrategy::new("calm", "Calm", 10)
            .with_rule(AdjustmentRule::new(WaveParameter::Damping, RuleAction::SetTo(5.0)));
        let current = WaveMatrixSettings::default().with(WaveParameter::Damping, 0.95);
        let candidate = propose_settings(
            &strategy,
            &current,
            IssueSeverity::Low,
            &ParameterRanges::default(),
            0.5,
        );
        assert_eq!(candidate.get(WaveParameter::Damping), Some(1.0));
    }

    #[test]
    fn test_severity_scales_rules() {
        let strategy = AdjustmentStrategy::new("s", "S", 1).with_rule(
            AdjustmentRule::new(WaveParameter::Amplitude, RuleAction::Scale(0.9)).severity_scaled(),
        );
        let current = WaveMatrixSettings::default();
        let ranges = ParameterRanges::default();
        let low = propose_settings(&strategy, &current, IssueSeverity::Low, &ranges, 1.0);
        let high = propose_settings(&strategy, &current, IssueSeverity::High, &ranges, 1.0);
        assert!((low.get(WaveParameter::Amplitude).unwrap() - 0.95).abs() < 1e-9);
        assert!((high.get(WaveParameter::Amplitude).unwrap() - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_unranged_parameter_at_zero_can_move() {
        let strategy = AdjustmentStrategy::new("tilt", "Tilt", 10)
            .with_rule(AdjustmentRule::new(WaveParameter::Speed, RuleAction::Offset(0.5)));
        let current = WaveMatrixSettings::default().with(WaveParameter::Speed, 0.0);
        let candidate = propose_settings(
            &strategy,
            &current,
            IssueSeverity::Low,
            &ParameterRanges::empty(),
            0.2,
        );
        assert!((candidate.get(WaveParameter::Speed).unwrap() - 0.2).abs() < 1e-9);

        let large = WaveMatrixSettings::default().with(WaveParameter::Speed, 10.0);
        let candidate =
            propose_settings(&strategy, &large, IssueSeverity::Low, &ParameterRanges::empty(), 0.2);
        assert!((candidate.get(WaveParameter::Speed).unwrap() - 10.5).abs() < 1e-9);
    }

    #[test]
    fn test_limits_gate_in_order() {
        let mut config = ControllerConfig::default();
        config.limits.max_adjustments_per_session = 1;
        let mut session = session_with(config);
        let now = Utc::now();
        assert!(check_limits(&session, now).is_ok());

        session.adjustment_history.push(WaveParameterAdjustment::new(
            AdjustmentType::Automatic,
            "x",
            WaveMatrixSettings::default(),
            WaveMatrixSettings::default(),
            now,
        ));
        let (outcome, _) = check_limits(&session, now + chrono::Duration::hours(1)).unwrap_err();
        assert_eq!(outcome, AdjustmentOutcome::BudgetExhausted);
        assert!(outcome.is_policy_rejection());
    }

    #[test]
    fn test_rate_limit() {
        let mut session = session_with(ControllerConfig::default());
        let now = Utc::now();
        session.adjustment_history.push(WaveParameterAdjustment::new(
            AdjustmentType::Automatic,
            "x",
            WaveMatrixSettings::default(),
            WaveMatrixSettings::default(),
            now,
        ));
        let (outcome, _) = check_limits(&session, now + chrono::Duration::seconds(10)).unwrap_err();
        assert_eq!(outcome, AdjustmentOutcome::RateLimited);
        assert!(check_limits(&session, now + chrono::Duration::seconds(30)).is_ok());
    }

    #[test]
    fn test_disabled_gate() {
        let mut config = ControllerConfig::default();
        config.limits.enable_automatic_adjustments = false;
        let session = session_with(config);
        let (outcome, _) = check_limits(&session, Utc::now()).unwrap_err();
        assert_eq!(outcome, AdjustmentOutcome::Disabled);
    }

    #[tokio::test]
    async fn test_submit_commits_accepted_candidate() {
        let clock = Arc::new(ManualClock::starting_now());
        let adjuster = ParameterAdjuster::new(Arc::new(PermissiveSettingsValidator), clock.clone());
        let handle = SessionHandle::new(session_with(ControllerConfig::default()));
        let mut session = handle.lock().await;

        let candidate = session.current_settings.clone().with(WaveParameter::Speed, 0.8);
        let result = adjuster
            .submit(&handle, &mut session, AdjustmentRequest::manual(candidate.clone(), "operator"))
            .await;

        assert!(result.is_successful);
        assert_eq!(session.current_settings, candidate);
        assert_eq!(session.manual_history.len(), 1);
        assert!(session.adjustment_history.is_empty());
        assert_eq!(session.metrics.adjustments_succeeded, 1);
    }

    #[tokio::test]
    async fn test_submit_rejection_leaves_state() {
        let clock = Arc::new(ManualClock::starting_now());
        let adjuster =
            ParameterAdjuster::new(Arc::new(RejectingSettingsValidator::new("no")), clock);
        let handle = SessionHandle::new(session_with(ControllerConfig::default()));
        let mut session = handle.lock().await;
        let before = session.current_settings.clone();

        let candidate = before.clone().with(WaveParameter::Speed, 0.8);
        let result = adjuster
            .submit(
                &handle,
                &mut session,
                AdjustmentRequest::from_strategy(&slow_down(), candidate, Vec::new()),
            )
            .await;

        assert!(!result.is_successful);
        assert_eq!(result.outcome, AdjustmentOutcome::RejectedByValidator);
        assert_eq!(result.validator_reasons, vec!["no".to_string()]);
        assert_eq!(session.current_settings, before);
        assert_eq!(session.consecutive_failures, 1);
        assert_eq!(session.metrics.adjustments_failed, 1);
    }

    #[tokio::test]
    async fn test_cancelled_session_discards_commit() {
        let clock = Arc::new(ManualClock::starting_now());
        clock.advance(Duration::from_secs(1));
        let adjuster = ParameterAdjuster::new(Arc::new(PermissiveSettingsValidator), clock);
        let handle = SessionHandle::new(session_with(ControllerConfig::default()));
        handle.cancel();
        let mut session = handle.lock().await;
        let before = session.current_settings.clone();

        let candidate = before.clone().with(WaveParameter::Speed, 0.8);
        let result = adjuster
            .submit(&handle, &mut session, AdjustmentRequest::manual(candidate, "late"))
            .await;

        assert_eq!(result.outcome, AdjustmentOutcome::Cancelled);
        assert_eq!(session.current_settings, before);
        assert_eq!(session.metrics.adjustments_attempted, 0);
    }

    #[tokio::test]
    async fn test_unchanged_candidate_is_not_submitted() {
        let clock = Arc::new(ManualClock::starting_now());
        let adjuster =
            ParameterAdjuster::new(Arc::new(RejectingSettingsValidator::new("no")), clock);
        let handle = SessionHandle::new(session_with(ControllerConfig::default()));
        let mut session = handle.lock().await;
        let same = session.current_settings.clone();

        let result = adjuster
            .submit(&handle, &mut session, AdjustmentRequest::manual(same, "noop"))
            .await;
        assert_eq!(result.outcome, AdjustmentOutcome::NoChange);
        assert_eq!(session.consecutive_failures, 0);
    }
}
