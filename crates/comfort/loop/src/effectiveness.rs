//! Adjustment effectiveness back-fill.
//!
//! After a commit the session collects the next scores; once the evaluation
//! window is full (or another adjustment supersedes it) the mean improvement
//! over the baseline is mapped to an effectiveness score and written to the
//! adjustment exactly once. A safety-critical reading ends the evaluation on
//! the spot, and the adjustment is then never promoted.

use comfort_types::AdjustmentId;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::session::FeedbackSession;

/// Outcome of one effectiveness measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectivenessUpdate {
    pub adjustment_id: AdjustmentId,
    pub effectiveness: f64,

    /// Mean score after the adjustment minus its baseline.
    pub improvement: f64,

    pub samples: usize,

    /// Whether the adjustment's result became last-known-good.
    pub promoted: bool,
}

/// Feed a new score to the pending evaluation, finalizing it when its window
/// is full.
pub fn observe(session: &mut FeedbackSession, score: f64) -> Option<EffectivenessUpdate> {
    let window = session.config.effectiveness.evaluation_window;
    let pending = session.pending_evaluation.as_mut()?;
    pending.samples.push(score);
    if pending.samples.len() < window {
        return None;
    }
    conclude(session, true)
}

/// Feed a safety-critical score and end the pending evaluation without
/// promotion.
pub fn observe_critical(
    session: &mut FeedbackSession,
    score: f64,
) -> Option<EffectivenessUpdate> {
    session.pending_evaluation.as_mut()?.samples.push(score);
    conclude(session, false)
}

/// Finalize the pending evaluation with whatever samples exist.
///
/// Without samples nothing is recorded and the adjustment's effectiveness
/// stays unknown.
pub fn finalize(session: &mut FeedbackSession) -> Option<EffectivenessUpdate> {
    conclude(session, true)
}

fn conclude(session: &mut FeedbackSession, may_promote: bool) -> Option<EffectivenessUpdate> {
    let pending = session.pending_evaluation.take()?;
    if pending.samples.is_empty() {
        debug!(
            session_id = %session.id,
            adjustment_id = %pending.adjustment_id,
            "Adjustment superseded before any data arrived"
        );
        return None;
    }

    let config = session.config.effectiveness.clone();
    let mean = pending.samples.iter().sum::<f64>() / pending.samples.len() as f64;
    let improvement = mean - pending.baseline;
    let effectiveness = config.effectiveness_for(improvement);

    let adjustment = session.adjustment_mut(&pending.adjustment_id)?;
    if !adjustment.record_effectiveness(effectiveness) {
        return None;
    }
    let settings_after = adjustment.settings_after.clone();

    let critical = session.thresholds.critical_comfort_score;
    let promoted = may_promote
        && effectiveness > config.success_threshold
        && pending.samples.iter().all(|s| *s > critical);
    if promoted {
        session.last_known_good = Some(settings_after);
    }

    debug!(
        session_id = %session.id,
        adjustment_id = %pending.adjustment_id,
        effectiveness,
        improvement,
        promoted,
        "Adjustment effectiveness recorded"
    );

    Some(EffectivenessUpdate {
        adjustment_id: pending.adjustment_id,
        effectiveness,
        improvement,
        samples: pending.samples.len(),
        promoted,
    })
}
