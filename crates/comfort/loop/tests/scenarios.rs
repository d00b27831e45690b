//! End-to-end controller scenarios driven by a manual clock.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use comfort_loop::{
    AdjustmentOutcome, Clock, ControllerConfig, ControllerResult, FeedbackEvent,
    FeedbackEventEnvelope, FeedbackLoopController, ManualClock, PermissiveSettingsValidator,
    RejectingSettingsValidator, RollbackTarget, SettingsValidator, SettingsVerdict,
    StrategyLibrary,
};
use comfort_types::{
    AdjustmentRule, AdjustmentStrategy, ComfortDataPoint, ComfortReadings, IssueType,
    MeasurementMethod, RuleAction, SessionId, SessionStatus, StrategyId, WaveMatrixSettings,
    WaveParameter,
};
use tokio::sync::{broadcast, Notify};

fn controller_with(
    config: ControllerConfig,
    validator: Arc<dyn SettingsValidator>,
) -> (Arc<FeedbackLoopController>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_now());
    let controller = FeedbackLoopController::new(config, validator, clock.clone()).unwrap();
    (Arc::new(controller), clock)
}

fn controller() -> (Arc<FeedbackLoopController>, Arc<ManualClock>) {
    controller_with(ControllerConfig::default(), Arc::new(PermissiveSettingsValidator))
}

fn reading(clock: &ManualClock, overall: f64) -> ComfortDataPoint {
    ComfortDataPoint::new(
        clock.now(),
        MeasurementMethod::Questionnaire,
        ComfortReadings::overall(overall),
    )
}

async fn start(controller: &FeedbackLoopController) -> SessionId {
    let started = controller
        .start_feedback_loop(WaveMatrixSettings::default())
        .await;
    assert!(started.is_successful, "{:?}", started.messages);
    started.session_id.unwrap()
}

fn drain(rx: &mut broadcast::Receiver<FeedbackEventEnvelope>) -> Vec<&'static str> {
    let mut names = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        names.push(envelope.event.name());
    }
    names
}

#[tokio::test]
async fn declining_comfort_adjusts_then_rolls_back_to_initial() {
    let (controller, clock) = controller();
    let id = start(&controller).await;
    let initial = WaveMatrixSettings::default();

    let mut adjusted_at = Vec::new();
    let mut rolled_back_at = Vec::new();
    for (i, score) in [85.0, 80.0, 78.0, 55.0, 25.0].into_iter().enumerate() {
        clock.advance(Duration::from_secs(10));
        let result = controller
            .process_comfort_data(&id, reading(&clock, score))
            .await;
        assert!(result.is_successful);
        if result.adjusted() {
            adjusted_at.push(i);
        }
        if result.rolled_back() {
            rolled_back_at.push(i);
        }
    }

    assert_eq!(adjusted_at, vec![3]);
    assert_eq!(rolled_back_at, vec![4]);

    let snapshot = controller.session_snapshot(&id).await.unwrap();
    assert_eq!(snapshot.current_settings, initial);
    assert_eq!(snapshot.adjustment_count, 0);
    assert_eq!(snapshot.rollback_count, 1);
    assert_eq!(snapshot.metrics.counters.rollbacks, 1);
}

#[tokio::test]
async fn adjustment_budget_is_enforced() {
    let mut config = ControllerConfig::default();
    config.limits.max_adjustments_per_session = 2;
    let (controller, clock) = controller_with(config, Arc::new(PermissiveSettingsValidator));
    let mut rx = controller.subscribe();
    let id = start(&controller).await;

    let mut last = None;
    for _ in 0..3 {
        clock.advance(Duration::from_secs(31));
        last = Some(controller.process_comfort_data(&id, reading(&clock, 55.0)).await);
    }

    let names = drain(&mut rx);
    assert_eq!(
        names.iter().filter(|n| **n == "parameters-adjusted").count(),
        2
    );
    assert_eq!(
        names.iter().filter(|n| **n == "adjustment-rejected").count(),
        1
    );

    let third = last.unwrap().adjustment.unwrap();
    assert!(!third.is_successful);
    assert_eq!(third.outcome, AdjustmentOutcome::BudgetExhausted);

    let metrics = controller.metrics(&id).await.unwrap();
    assert_eq!(metrics.counters.adjustments_succeeded, 2);
    assert_eq!(metrics.counters.policy_rejections, 1);
}

#[tokio::test]
async fn adjustments_are_rate_limited() {
    let (controller, clock) = controller();
    let id = start(&controller).await;

    clock.advance(Duration::from_secs(1));
    let first = controller.process_comfort_data(&id, reading(&clock, 55.0)).await;
    assert!(first.adjusted());

    clock.advance(Duration::from_secs(10));
    let second = controller.process_comfort_data(&id, reading(&clock, 55.0)).await;
    assert_eq!(
        second.adjustment.unwrap().outcome,
        AdjustmentOutcome::RateLimited
    );

    clock.advance(Duration::from_secs(25));
    let third = controller.process_comfort_data(&id, reading(&clock, 55.0)).await;
    assert!(third.adjusted());
}

#[tokio::test]
async fn stopping_unknown_session_reports_not_found() {
    let (controller, _) = controller();
    let result = controller.stop_feedback_loop(&SessionId::generate()).await;
    assert!(!result.is_successful);
    assert_eq!(result.messages, vec!["Session not found".to_string()]);
}

#[tokio::test]
async fn highest_priority_strategy_wins() {
    let library = StrategyLibrary::new(vec![
        AdjustmentStrategy::new("gentle", "Gentle", 90)
            .addressing(IssueType::MotionSickness)
            .with_rule(AdjustmentRule::new(WaveParameter::Speed, RuleAction::Scale(0.95))),
        AdjustmentStrategy::new("firm", "Firm", 100)
            .addressing(IssueType::MotionSickness)
            .with_rule(AdjustmentRule::new(WaveParameter::Amplitude, RuleAction::Scale(0.9))),
    ]);
    let (controller, clock) = controller();
    controller.set_strategies(library).await;
    let id = start(&controller).await;

    clock.advance(Duration::from_secs(1));
    let result = controller.process_comfort_data(&id, reading(&clock, 55.0)).await;
    let adjustment = result.adjustment.unwrap();
    assert!(adjustment.is_successful);
    assert_eq!(adjustment.strategy, Some(StrategyId::new("firm")));
}

#[tokio::test]
async fn identical_inputs_give_identical_decisions() {
    let start_at = chrono::Utc::now();
    let mut outcomes = Vec::new();

    for _ in 0..2 {
        let clock = Arc::new(ManualClock::new(start_at));
        let controller = FeedbackLoopController::new(
            ControllerConfig::default(),
            Arc::new(PermissiveSettingsValidator),
            clock.clone(),
        )
        .unwrap();
        let id = start(&controller).await;

        let mut run = Vec::new();
        for score in [70.0, 58.0, 52.0, 61.0, 45.0, 40.0, 75.0] {
            clock.advance(Duration::from_secs(20));
            let result = controller.process_comfort_data(&id, reading(&clock, score)).await;
            run.push((
                result.score.map(|s| s.score),
                result.adjustment.map(|a| a.outcome),
                result.rollback.is_some(),
            ));
        }
        let snapshot = controller.session_snapshot(&id).await.unwrap();
        outcomes.push((run, snapshot.current_settings));
    }

    assert_eq!(outcomes[0], outcomes[1]);
}

#[tokio::test]
async fn paused_session_rejects_data_until_resumed() {
    let (controller, clock) = controller();
    let id = start(&controller).await;

    assert!(controller.pause_feedback_loop(&id).await.is_successful);
    assert!(!controller.pause_feedback_loop(&id).await.is_successful);

    clock.advance(Duration::from_secs(1));
    let rejected = controller.process_comfort_data(&id, reading(&clock, 80.0)).await;
    assert!(!rejected.is_successful);

    let resumed = controller.resume_feedback_loop(&id).await;
    assert_eq!(resumed.status, Some(SessionStatus::Active));
    let accepted = controller.process_comfort_data(&id, reading(&clock, 80.0)).await;
    assert!(accepted.is_successful);
}

#[tokio::test]
async fn stopped_session_stays_queryable() {
    let (controller, clock) = controller();
    let id = start(&controller).await;
    clock.advance(Duration::from_secs(1));
    controller.process_comfort_data(&id, reading(&clock, 72.0)).await;

    let first = controller.stop_feedback_loop(&id).await;
    assert!(first.is_successful);
    let second = controller.stop_feedback_loop(&id).await;
    assert!(!second.is_successful);

    let processing = controller.process_comfort_data(&id, reading(&clock, 72.0)).await;
    assert!(!processing.is_successful);

    let report = controller.feedback_report(&id).await.unwrap();
    assert_eq!(report.summary.status, SessionStatus::Completed);
    assert_eq!(report.summary.data_points, 1);
    assert!(controller.validate_comfort_levels(&id).await.is_valid);
}

#[tokio::test]
async fn repeated_validator_rejections_force_rollback() {
    let (controller, clock) = controller_with(
        ControllerConfig::default(),
        Arc::new(RejectingSettingsValidator::new("outside rig envelope")),
    );
    let id = start(&controller).await;

    let mut rollbacks = 0;
    for _ in 0..3 {
        clock.advance(Duration::from_secs(1));
        let result = controller.process_comfort_data(&id, reading(&clock, 55.0)).await;
        let adjustment = result.adjustment.as_ref().unwrap();
        assert_eq!(adjustment.outcome, AdjustmentOutcome::RejectedByValidator);
        if result.rolled_back() {
            rollbacks += 1;
        }
    }

    assert_eq!(rollbacks, 1);
    let metrics = controller.metrics(&id).await.unwrap();
    assert_eq!(metrics.counters.adjustments_failed, 3);
    assert_eq!(metrics.counters.rollbacks, 1);
}

#[tokio::test]
async fn effective_adjustment_becomes_rollback_target() {
    let (controller, clock) = controller();
    let id = start(&controller).await;

    clock.advance(Duration::from_secs(1));
    let adjusted = controller.process_comfort_data(&id, reading(&clock, 55.0)).await;
    let committed = adjusted.adjustment.unwrap().adjustment.unwrap();

    let mut recorded = None;
    for _ in 0..3 {
        clock.advance(Duration::from_secs(5));
        let result = controller.process_comfort_data(&id, reading(&clock, 82.0)).await;
        if result.effectiveness.is_some() {
            recorded = result.effectiveness;
        }
    }
    let update = recorded.unwrap();
    assert!(update.promoted);
    assert_eq!(update.adjustment_id, committed.id);

    clock.advance(Duration::from_secs(5));
    let collapse = controller.process_comfort_data(&id, reading(&clock, 20.0)).await;
    let rollback = collapse.rollback.unwrap();
    assert_eq!(rollback.target, Some(RollbackTarget::LastKnownGood));
    assert_eq!(rollback.restored_settings, Some(committed.settings_after));
}

#[tokio::test]
async fn collapse_never_promotes_live_settings() {
    let (controller, clock) = controller();
    let id = start(&controller).await;

    clock.advance(Duration::from_secs(1));
    let adjusted = controller.process_comfort_data(&id, reading(&clock, 55.0)).await;
    let committed = adjusted.adjustment.unwrap().adjustment.unwrap();

    for _ in 0..2 {
        clock.advance(Duration::from_secs(5));
        let result = controller.process_comfort_data(&id, reading(&clock, 90.0)).await;
        assert!(result.effectiveness.is_none());
    }

    // The collapse fills the evaluation window with a mean well above baseline
    clock.advance(Duration::from_secs(5));
    let collapse = controller.process_comfort_data(&id, reading(&clock, 25.0)).await;
    let update = collapse.effectiveness.unwrap();
    assert_eq!(update.adjustment_id, committed.id);
    assert!(update.effectiveness > 0.7);
    assert!(!update.promoted);

    let rollback = collapse.rollback.unwrap();
    assert_eq!(rollback.target, Some(RollbackTarget::Initial));
    assert_eq!(rollback.restored_settings, Some(WaveMatrixSettings::default()));
    assert_ne!(rollback.restored_settings, Some(committed.settings_after));

    let snapshot = controller.session_snapshot(&id).await.unwrap();
    assert_eq!(snapshot.last_known_good, None);
    assert_eq!(snapshot.current_settings, WaveMatrixSettings::default());
}

#[tokio::test]
async fn critical_issue_rolls_back_above_critical_score() {
    let (controller, clock) = controller();
    let mut rx = controller.subscribe();
    let id = start(&controller).await;

    clock.advance(Duration::from_secs(1));
    assert!(controller
        .process_comfort_data(&id, reading(&clock, 55.0))
        .await
        .adjusted());
    drain(&mut rx);

    clock.advance(Duration::from_secs(5));
    let point = ComfortDataPoint::new(
        clock.now(),
        MeasurementMethod::Questionnaire,
        ComfortReadings {
            disorientation: Some(75.0),
            ..ComfortReadings::overall(90.0)
        },
    );
    let result = controller.process_comfort_data(&id, point).await;

    let thresholds = controller.config().await.thresholds.clone();
    assert!(result.score.as_ref().unwrap().score > thresholds.critical_comfort_score);
    assert!(result
        .validation
        .as_ref()
        .unwrap()
        .issues
        .iter()
        .any(|i| i.issue_type == IssueType::Disorientation && i.is_critical()));
    assert!(result.rolled_back());
    assert!(result.adjustment.is_none());
    assert!(drain(&mut rx).contains(&"automatic-rollback-triggered"));

    let snapshot = controller.session_snapshot(&id).await.unwrap();
    assert_eq!(snapshot.adjustment_count, 0);
    assert_eq!(snapshot.current_settings, WaveMatrixSettings::default());
}

#[tokio::test]
async fn superseded_adjustment_effectiveness_is_published() {
    let (controller, clock) = controller();
    let mut rx = controller.subscribe();
    let id = start(&controller).await;

    clock.advance(Duration::from_secs(1));
    let first = controller.process_comfort_data(&id, reading(&clock, 55.0)).await;
    let first_id = first.adjustment.unwrap().adjustment.unwrap().id;
    drain(&mut rx);

    clock.advance(Duration::from_secs(31));
    let second = controller.process_comfort_data(&id, reading(&clock, 56.0)).await;
    assert!(second.adjusted());

    let update = second.effectiveness.clone().unwrap();
    assert_eq!(update.adjustment_id, first_id);
    assert_eq!(update.samples, 1);
    assert_eq!(second.adjustment.unwrap().superseded, Some(update));

    let names = drain(&mut rx);
    assert_eq!(
        names.iter().filter(|n| **n == "effectiveness-recorded").count(),
        1
    );
    let recorded = names.iter().position(|n| *n == "effectiveness-recorded");
    let adjusted = names.iter().position(|n| *n == "parameters-adjusted");
    assert!(recorded < adjusted);
}

#[tokio::test]
async fn forced_rollback_is_reported_to_caller() {
    let (controller, _clock) = controller_with(
        ControllerConfig::default(),
        Arc::new(RejectingSettingsValidator::new("outside rig envelope")),
    );
    let id = start(&controller).await;
    let settings = WaveMatrixSettings::default().with(WaveParameter::Damping, 0.7);

    for _ in 0..2 {
        let result = controller
            .apply_manual_adjustments(&id, settings.clone(), "operator")
            .await;
        assert_eq!(result.outcome, AdjustmentOutcome::RejectedByValidator);
        assert!(result.rollback.is_none());
    }

    let third = controller
        .apply_manual_adjustments(&id, settings, "operator")
        .await;
    let rollback = third.rollback.unwrap();
    assert!(rollback.is_successful);
    assert_eq!(rollback.reason, "3 consecutive adjustment failures");
    assert!(third.messages.iter().any(|m| m.starts_with("rolled back")));
}

#[tokio::test]
async fn manual_adjustments_bypass_budget() {
    let mut config = ControllerConfig::default();
    config.limits.max_adjustments_per_session = 1;
    let (controller, clock) = controller_with(config, Arc::new(PermissiveSettingsValidator));
    let id = start(&controller).await;

    clock.advance(Duration::from_secs(1));
    assert!(controller
        .process_comfort_data(&id, reading(&clock, 55.0))
        .await
        .adjusted());

    let manual = WaveMatrixSettings::default().with(WaveParameter::Damping, 0.7);
    let result = controller
        .apply_manual_adjustments(&id, manual.clone(), "operator override")
        .await;
    assert!(result.is_successful);

    let snapshot = controller.session_snapshot(&id).await.unwrap();
    assert_eq!(snapshot.adjustment_count, 1);
    assert_eq!(snapshot.manual_adjustment_count, 1);
    assert_eq!(snapshot.current_settings, manual);
}

#[tokio::test]
async fn emergency_rollback_on_request() {
    let (controller, clock) = controller();
    let mut rx = controller.subscribe();
    let id = start(&controller).await;

    clock.advance(Duration::from_secs(1));
    controller.process_comfort_data(&id, reading(&clock, 55.0)).await;
    let result = controller
        .trigger_emergency_rollback(&id, "participant request")
        .await;
    assert!(result.is_successful);
    assert_eq!(result.cleared_adjustments, 1);
    assert!(drain(&mut rx).contains(&"automatic-rollback-triggered"));

    let missing = controller
        .trigger_automatic_rollback(&SessionId::generate(), "test")
        .await;
    assert!(!missing.is_successful);
}

#[tokio::test]
async fn capacity_limits_active_sessions() {
    let mut config = ControllerConfig::default();
    config.max_active_sessions = 2;
    let (controller, _) = controller_with(config, Arc::new(PermissiveSettingsValidator));

    let first = start(&controller).await;
    start(&controller).await;
    let third = controller
        .start_feedback_loop(WaveMatrixSettings::default())
        .await;
    assert!(!third.is_successful);
    assert!(third.messages[0].contains("capacity"));

    controller.stop_feedback_loop(&first).await;
    assert!(
        controller
            .start_feedback_loop(WaveMatrixSettings::default())
            .await
            .is_successful
    );
}

struct GatedValidator {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl SettingsValidator for GatedValidator {
    async fn validate(&self, _settings: &WaveMatrixSettings) -> ControllerResult<SettingsVerdict> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(SettingsVerdict::accept())
    }
}

#[tokio::test]
async fn stop_discards_adjustment_awaiting_validation() {
    let validator = Arc::new(GatedValidator {
        entered: Notify::new(),
        release: Notify::new(),
    });
    let (controller, clock) = controller_with(ControllerConfig::default(), validator.clone());
    let id = start(&controller).await;

    clock.advance(Duration::from_secs(1));
    let point = reading(&clock, 55.0);
    let processing = {
        let controller = controller.clone();
        let id = id.clone();
        tokio::spawn(async move { controller.process_comfort_data(&id, point).await })
    };
    validator.entered.notified().await;

    let stopping = {
        let controller = controller.clone();
        let id = id.clone();
        tokio::spawn(async move { controller.stop_feedback_loop(&id).await })
    };
    while controller.active_session_count() > 0 {
        tokio::task::yield_now().await;
    }
    validator.release.notify_one();

    let processed = processing.await.unwrap();
    assert_eq!(
        processed.adjustment.unwrap().outcome,
        AdjustmentOutcome::Cancelled
    );
    assert!(stopping.await.unwrap().is_successful);

    let snapshot = controller.session_snapshot(&id).await.unwrap();
    assert_eq!(snapshot.current_settings, WaveMatrixSettings::default());
    assert_eq!(snapshot.adjustment_count, 0);
    assert_eq!(snapshot.metrics.counters.adjustments_attempted, 0);
}

#[tokio::test]
async fn events_follow_session_lifecycle() {
    let (controller, clock) = controller();
    let mut rx = controller.subscribe();
    let id = start(&controller).await;

    clock.advance(Duration::from_secs(1));
    controller.process_comfort_data(&id, reading(&clock, 80.0)).await;
    controller.stop_feedback_loop(&id).await;

    let mut events = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        assert_eq!(envelope.session_id, id);
        events.push(envelope.event);
    }
    assert!(matches!(events.first(), Some(FeedbackEvent::SessionStarted { .. })));
    assert!(matches!(events.get(1), Some(FeedbackEvent::ValidationPassed { .. })));
    assert!(matches!(
        events.last(),
        Some(FeedbackEvent::SessionStopped {
            status: SessionStatus::Completed,
            ..
        })
    ));
}

#[tokio::test]
async fn repeated_validation_is_stable() {
    let (controller, clock) = controller();
    let id = start(&controller).await;
    clock.advance(Duration::from_secs(1));
    controller.process_comfort_data(&id, reading(&clock, 57.0)).await;

    let first = controller.validate_comfort_levels(&id).await;
    let second = controller.validate_comfort_levels(&id).await;
    assert_eq!(first.is_valid, second.is_valid);
    assert_eq!(first.overall_comfort_score, second.overall_comfort_score);
    assert!(!first.is_valid);

    // Validation has no side effects on the session
    let metrics = controller.metrics(&id).await.unwrap();
    assert_eq!(metrics.counters.validations_failed, 1);
}
