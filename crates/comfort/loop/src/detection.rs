//! Issue detection and comfort validation.
//!
//! The detector compares a scored measurement against the session's
//! thresholds. Each crossed threshold yields a violation and a derived
//! [`ComfortIssue`]; confident downward predictions yield trend warnings that
//! never affect validity.

use chrono::{DateTime, Utc};
use comfort_types::{
    ComfortIssue, ComfortValidationThresholds, IssueSeverity, IssueType, MetricPolarity,
    MetricThreshold, MetricType, SessionId,
};
use serde::{Deserialize, Serialize};

use crate::scoring::ComfortScore;
use crate::trend::ComfortPrediction;

/// Prediction confidence required before a trend warning is raised.
pub const MIN_WARNING_CONFIDENCE: f64 = 0.3;

/// One crossed threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComfortValidationViolation {
    pub metric: MetricType,

    /// Observed sub-score (0-100).
    pub value: f64,

    pub threshold: MetricThreshold,

    /// |value - limit| relative to the limit.
    pub relative_deviation: f64,

    /// Whether the value also crossed the metric's critical value.
    pub critical_breach: bool,

    pub severity: IssueSeverity,
}

impl ComfortValidationViolation {
    pub fn describe(&self) -> String {
        let relation = match self.metric.polarity() {
            MetricPolarity::HigherIsBetter => "below minimum",
            MetricPolarity::LowerIsBetter => "above maximum",
        };
        format!(
            "{} {:.1} {} {:.1} ({} severity)",
            self.metric, self.value, relation, self.threshold.limit, self.severity
        )
    }
}

/// Warning derived from a confident downward prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendWarning {
    pub predicted_score: f64,
    pub horizon: usize,
    pub confidence: f64,
    pub message: String,
}

/// Outcome of validating a session's comfort level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComfortValidationResult {
    pub session_id: SessionId,

    /// True iff there are no violations.
    pub is_valid: bool,

    /// Aggregate comfort score evaluated (0-100).
    pub overall_comfort_score: f64,

    pub violations: Vec<ComfortValidationViolation>,

    pub issues: Vec<ComfortIssue>,

    pub trend_warnings: Vec<TrendWarning>,

    pub messages: Vec<String>,

    pub evaluated_at: DateTime<Utc>,
}

impl ComfortValidationResult {
    /// Result for a session that does not exist.
    pub fn session_not_found(session_id: SessionId, at: DateTime<Utc>) -> Self {
        Self {
            session_id,
            is_valid: false,
            overall_comfort_score: 0.0,
            violations: Vec::new(),
            issues: Vec::new(),
            trend_warnings: Vec::new(),
            messages: vec!["Session not found".to_string()],
            evaluated_at: at,
        }
    }

    /// Result for a session that has not received any data yet.
    pub fn no_data(session_id: SessionId, score: f64, at: DateTime<Utc>) -> Self {
        Self {
            session_id,
            is_valid: true,
            overall_comfort_score: score,
            violations: Vec::new(),
            issues: Vec::new(),
            trend_warnings: Vec::new(),
            messages: vec!["No comfort data received yet".to_string()],
            evaluated_at: at,
        }
    }

    /// Whether the aggregate score is at or below the critical comfort score,
    /// or any issue is critical.
    pub fn is_safety_critical(&self, thresholds: &ComfortValidationThresholds) -> bool {
        self.overall_comfort_score <= thresholds.critical_comfort_score
            || self.issues.iter().any(|i| i.is_critical())
    }

    /// Most severe detected issue.
    pub fn max_severity(&self) -> Option<IssueSeverity> {
        self.issues.iter().map(|i| i.severity).max()
    }
}

/// Threshold-based issue detector.
#[derive(Debug, Clone, Default)]
pub struct IssueDetector {
    predictive_issues: bool,
}

impl IssueDetector {
    pub fn new(predictive_issues: bool) -> Self {
        Self { predictive_issues }
    }

    /// Validate a score against thresholds.
    ///
    /// The aggregate score is checked against the minimum comfort score; every
    /// other present sub-score against its own threshold.
    pub fn evaluate(
        &self,
        session_id: SessionId,
        score: &ComfortScore,
        thresholds: &ComfortValidationThresholds,
        prediction: Option<&ComfortPrediction>,
        at: DateTime<Utc>,
    ) -> ComfortValidationResult {
        let mut violations = Vec::new();

        if let Some(v) = check(MetricType::OverallComfort, score.score, &thresholds.overall()) {
            violations.push(v);
        }
        for (metric, value) in &score.sub_scores {
            if *metric == MetricType::OverallComfort {
                continue;
            }
            if let Some(threshold) = thresholds.for_metric(*metric) {
                if let Some(v) = check(*metric, *value, &threshold) {
                    violations.push(v);
                }
            }
        }

        let mut issues: Vec<ComfortIssue> = violations
            .iter()
            .map(|v| {
                ComfortIssue::new(
                    IssueType::for_metric(v.metric),
                    v.severity,
                    v.metric,
                    score.confidence,
                    at,
                )
                .with_data_points(vec![score.data_point.clone()])
            })
            .collect();

        let mut trend_warnings = Vec::new();
        if let Some(prediction) = prediction {
            if prediction.confidence >= MIN_WARNING_CONFIDENCE
                && prediction.predicted_score < thresholds.minimum_comfort_score
                && score.score >= prediction.predicted_score
            {
                trend_warnings.push(TrendWarning {
                    predicted_score: prediction.predicted_score,
                    horizon: prediction.horizon,
                    confidence: prediction.confidence,
                    message: format!(
                        "comfort predicted to reach {:.1} within {} samples",
                        prediction.predicted_score, prediction.horizon
                    ),
                });

                if self.predictive_issues && violations.is_empty() {
                    issues.push(
                        ComfortIssue::new(
                            IssueType::MotionSickness,
                            IssueSeverity::Low,
                            MetricType::OverallComfort,
                            prediction.confidence,
                            at,
                        )
                        .with_data_points(vec![score.data_point.clone()])
                        .predicted(),
                    );
                }
            }
        }

        let mut messages: Vec<String> = violations.iter().map(|v| v.describe()).collect();
        messages.extend(trend_warnings.iter().map(|w| w.message.clone()));
        if violations.is_empty() {
            messages.push("comfort within thresholds".to_string());
        }

        ComfortValidationResult {
            session_id,
            is_valid: violations.is_empty(),
            overall_comfort_score: score.score,
            violations,
            issues,
            trend_warnings,
            messages,
            evaluated_at: at,
        }
    }
}

/// Compare one value with its threshold.
fn check(metric: MetricType, value: f64, threshold: &MetricThreshold) -> Option<ComfortValidationViolation> {
    let (violated, critical_breach) = match metric.polarity() {
        MetricPolarity::HigherIsBetter => (value < threshold.limit, value <= threshold.critical),
        MetricPolarity::LowerIsBetter => (value > threshold.limit, value >= threshold.critical),
    };
    if !violated {
        return None;
    }

    let deviation = (value - threshold.limit).abs();
    let relative_deviation = if threshold.limit.abs() > f64::EPSILON {
        deviation / threshold.limit.abs()
    } else {
        deviation / 100.0
    };

    let severity = if critical_breach {
        IssueSeverity::Critical
    } else {
        IssueSeverity::from_relative_deviation(relative_deviation)
    };

    Some(ComfortValidationViolation {
        metric,
        value,
        threshold: *threshold,
        relative_deviation,
        critical_breach,
        severity,
    })
}
