//! Feedback-loop performance metrics.
//!
//! Counters only ever grow; derived rates are recomputed on every read.

use serde::{Deserialize, Serialize};

/// Per-session (or aggregated) counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackLoopMetrics {
    pub data_points_processed: u64,
    pub data_points_rejected: u64,
    pub validations_passed: u64,
    pub validations_failed: u64,
    pub issues_detected: u64,

    /// Adjustments that reached the settings validator.
    pub adjustments_attempted: u64,
    pub adjustments_succeeded: u64,
    pub adjustments_failed: u64,

    /// Automatic attempts refused by the rate, count or enablement limits.
    pub policy_rejections: u64,

    pub rollbacks: u64,

    /// Sum of processed comfort scores, for the running average.
    pub comfort_score_sum: f64,
    pub min_comfort_score: Option<f64>,
    pub max_comfort_score: Option<f64>,
}

impl FeedbackLoopMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_score(&mut self, score: f64) {
        self.data_points_processed += 1;
        self.comfort_score_sum += score;
        self.min_comfort_score = Some(self.min_comfort_score.map_or(score, |m| m.min(score)));
        self.max_comfort_score = Some(self.max_comfort_score.map_or(score, |m| m.max(score)));
    }

    pub fn record_validation(&mut self, is_valid: bool, issues: usize) {
        if is_valid {
            self.validations_passed += 1;
        } else {
            self.validations_failed += 1;
        }
        self.issues_detected += issues as u64;
    }

    pub fn record_adjustment(&mut self, succeeded: bool) {
        self.adjustments_attempted += 1;
        if succeeded {
            self.adjustments_succeeded += 1;
        } else {
            self.adjustments_failed += 1;
        }
    }

    /// Fold another set of counters into this one.
    pub fn merge(&mut self, other: &FeedbackLoopMetrics) {
        self.data_points_processed += other.data_points_processed;
        self.data_points_rejected += other.data_points_rejected;
        self.validations_passed += other.validations_passed;
        self.validations_failed += other.validations_failed;
        self.issues_detected += other.issues_detected;
        self.adjustments_attempted += other.adjustments_attempted;
        self.adjustments_succeeded += other.adjustments_succeeded;
        self.adjustments_failed += other.adjustments_failed;
        self.policy_rejections += other.policy_rejections;
        self.rollbacks += other.rollbacks;
        self.comfort_score_sum += other.comfort_score_sum;
        self.min_comfort_score = min_opt(self.min_comfort_score, other.min_comfort_score);
        self.max_comfort_score = max_opt(self.max_comfort_score, other.max_comfort_score);
    }

    /// Counters plus derived rates.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            average_comfort_score: ratio(self.comfort_score_sum, self.data_points_processed),
            adjustment_success_rate: ratio(
                self.adjustments_succeeded as f64,
                self.adjustments_attempted,
            ),
            validation_pass_rate: ratio(
                self.validations_passed as f64,
                self.validations_passed + self.validations_failed,
            ),
            rollback_rate: ratio(self.rollbacks as f64, self.data_points_processed),
            counters: self.clone(),
        }
    }
}

/// Metrics as seen by a reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub counters: FeedbackLoopMetrics,

    /// `None` until a data point has been processed.
    pub average_comfort_score: Option<f64>,
    pub adjustment_success_rate: Option<f64>,
    pub validation_pass_rate: Option<f64>,

    /// Rollbacks per processed data point.
    pub rollback_rate: Option<f64>,
}

fn ratio(numerator: f64, denominator: u64) -> Option<f64> {
    (denominator > 0).then(|| numerator / denominator as f64)
}

fn min_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn max_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}
