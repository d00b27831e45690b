//! Property tests: adjustment budget and rate limit hold for any input stream.

use std::sync::Arc;
use std::time::Duration;

use comfort_loop::{
    Clock, ControllerConfig, FeedbackEvent, FeedbackLoopController, ManualClock,
    PermissiveSettingsValidator,
};
use comfort_types::{ComfortDataPoint, ComfortReadings, MeasurementMethod, WaveMatrixSettings};
use proptest::prelude::*;

const MAX_ADJUSTMENTS: usize = 3;
const MIN_GAP_SECS: u64 = 30;

/// Score and seconds elapsed before it arrives.
fn arb_stream() -> impl Strategy<Value = Vec<(f64, u64)>> {
    prop::collection::vec((0.0f64..100.0, 0u64..90), 1..40)
}

fn run_stream(stream: Vec<(f64, u64)>) -> Result<(), TestCaseError> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    rt.block_on(async move {
        let mut config = ControllerConfig::default();
        config.limits.max_adjustments_per_session = MAX_ADJUSTMENTS;
        config.limits.min_time_between_adjustments = Duration::from_secs(MIN_GAP_SECS);

        let clock = Arc::new(ManualClock::starting_now());
        let controller = FeedbackLoopController::new(
            config,
            Arc::new(PermissiveSettingsValidator),
            clock.clone(),
        )
        .unwrap();
        let mut rx = controller.subscribe();
        let id = controller
            .start_feedback_loop(WaveMatrixSettings::default())
            .await
            .session_id
            .unwrap();

        for (score, gap) in stream {
            clock.advance(Duration::from_secs(gap));
            let point = ComfortDataPoint::new(
                clock.now(),
                MeasurementMethod::Combined,
                ComfortReadings::overall(score),
            );
            let result = controller.process_comfort_data(&id, point).await;
            prop_assert!(result.is_successful);

            let snapshot = controller.session_snapshot(&id).await.unwrap();
            prop_assert!(snapshot.adjustment_count <= MAX_ADJUSTMENTS);
        }

        // Replay committed adjustments; a rollback starts a fresh budget
        let mut since_rollback = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            match envelope.event {
                FeedbackEvent::ParametersAdjusted { result } => {
                    let applied_at = result.adjustment.as_ref().unwrap().applied_at;
                    if let Some(previous) = since_rollback.last() {
                        let gap = applied_at.signed_duration_since(*previous);
                        prop_assert!(gap.num_seconds() >= MIN_GAP_SECS as i64);
                    }
                    since_rollback.push(applied_at);
                    prop_assert!(since_rollback.len() <= MAX_ADJUSTMENTS);
                }
                FeedbackEvent::AutomaticRollbackTriggered { .. } => since_rollback.clear(),
                _ => {}
            }
        }
        Ok(())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_budget_and_rate_limit_hold(stream in arb_stream()) {
        run_stream(stream)?;
    }
}

proptest! {
    #[test]
    fn prop_scores_stay_in_range(score in -50.0f64..150.0) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async move {
            let controller = FeedbackLoopController::with_system_clock(
                ControllerConfig::default(),
                Arc::new(PermissiveSettingsValidator),
            )
            .unwrap();
            let id = controller
                .start_feedback_loop(WaveMatrixSettings::default())
                .await
                .session_id
                .unwrap();
            let point = ComfortDataPoint::new(
                chrono::Utc::now(),
                MeasurementMethod::Physiological,
                ComfortReadings::overall(score),
            );
            let result = controller.process_comfort_data(&id, point).await;
            let value = result.score.unwrap().score;
            prop_assert!((0.0..=100.0).contains(&value));
            Ok(())
        })?;
    }
}
