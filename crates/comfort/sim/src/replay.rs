//! Trace replay through a controller driven by a manual clock.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use comfort_loop::{
    ControllerConfig, FeedbackEventEnvelope, FeedbackLoopController, FeedbackReport, ManualClock,
    ProcessingResult, RangeSettingsValidator, SettingsValidator,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::trace::Trace;

/// Everything a replay produced.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayOutcome {
    pub results: Vec<ProcessingResult>,
    pub events: Vec<FeedbackEventEnvelope>,
    pub report: FeedbackReport,
}

impl ReplayOutcome {
    pub fn adjustments(&self) -> usize {
        self.results.iter().filter(|r| r.adjusted()).count()
    }

    pub fn rollbacks(&self) -> usize {
        self.results.iter().filter(|r| r.rolled_back()).count()
    }
}

/// Replay with a validator that enforces the configured parameter ranges.
pub async fn replay(config: ControllerConfig, trace: &Trace) -> anyhow::Result<ReplayOutcome> {
    let validator = Arc::new(RangeSettingsValidator::new(config.parameter_ranges.clone()));
    replay_with(config, trace, validator).await
}

/// Replay `trace` as a single session.
///
/// The clock jumps to each point's timestamp before it is processed, and a
/// tick runs after every point.
pub async fn replay_with(
    config: ControllerConfig,
    trace: &Trace,
    validator: Arc<dyn SettingsValidator>,
) -> anyhow::Result<ReplayOutcome> {
    let start = trace.start();
    let clock = Arc::new(ManualClock::new(start));
    let controller = FeedbackLoopController::new(config, validator, clock.clone())?;
    let mut events = controller.subscribe();

    let started = controller
        .start_feedback_loop(trace.initial_settings.clone().unwrap_or_default())
        .await;
    let session_id = started
        .session_id
        .ok_or_else(|| anyhow!("session did not start: {}", started.messages.join("; ")))?;
    info!(session_id = %session_id, points = trace.points.len(), "Replaying trace");

    let mut results = Vec::with_capacity(trace.points.len());
    let mut collected = Vec::new();
    for point in trace.data_points(start) {
        clock.set(point.timestamp);
        let result = controller.process_comfort_data(&session_id, point).await;
        debug!(
            score = ?result.score.as_ref().map(|s| s.score),
            adjusted = result.adjusted(),
            rolled_back = result.rolled_back(),
            "Point replayed"
        );
        results.push(result);
        controller.tick().await;

        while let Ok(envelope) = events.try_recv() {
            collected.push(envelope);
        }
    }

    let stopped = controller.stop_feedback_loop(&session_id).await;
    if !stopped.is_successful {
        return Err(anyhow!("stop failed: {}", stopped.messages.join("; ")));
    }
    while let Ok(envelope) = events.try_recv() {
        collected.push(envelope);
    }

    let report = controller
        .feedback_report(&session_id)
        .await
        .context("building feedback report")?;

    Ok(ReplayOutcome {
        results,
        events: collected,
        report,
    })
}
