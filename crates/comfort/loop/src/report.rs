//! Terminal feedback report.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use comfort_types::{
    AdjustmentType, SessionId, SessionStatus, StrategyId, WaveMatrixSettings,
    WaveParameterAdjustment,
};
use serde::{Deserialize, Serialize};

use crate::metrics::MetricsSnapshot;
use crate::session::FeedbackSession;
use crate::trend::ComfortTrend;

/// Effectiveness below which a strategy is flagged for retuning.
const POOR_EFFECTIVENESS: f64 = 0.5;

/// Summary of a session's course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: i64,
    pub data_points: usize,
    pub final_score: Option<f64>,
    pub final_trend: ComfortTrend,
    pub automatic_adjustments: usize,
    pub manual_adjustments: usize,
    pub rollbacks: usize,
    pub initial_settings: WaveMatrixSettings,
    pub final_settings: WaveMatrixSettings,
    pub last_known_good: Option<WaveMatrixSettings>,
}

/// Effectiveness of one strategy within the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyEffectiveness {
    pub strategy: StrategyId,
    pub adjustments: usize,
    pub measured: usize,
    pub average_effectiveness: Option<f64>,
}

/// Adjustment effectiveness across the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectivenessAnalysis {
    /// Adjustments committed, automatic and manual, including ones later
    /// cleared by a rollback.
    pub adjustments: usize,
    pub measured: usize,
    pub successful: usize,
    pub average_effectiveness: Option<f64>,
    pub per_strategy: Vec<StrategyEffectiveness>,
}

/// End-of-session report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackReport {
    pub session_id: SessionId,
    pub summary: SessionSummary,
    pub effectiveness: EffectivenessAnalysis,
    pub metrics: MetricsSnapshot,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl FeedbackReport {
    /// Build the report for a session (active or archived).
    pub fn build(session: &FeedbackSession, at: DateTime<Utc>) -> Self {
        let adjustments: Vec<&WaveParameterAdjustment> = session
            .all_adjustments()
            .into_iter()
            .filter(|a| {
                matches!(
                    a.adjustment_type,
                    AdjustmentType::Automatic | AdjustmentType::Manual
                )
            })
            .collect();

        let end = session.ended_at.unwrap_or(at);
        let summary = SessionSummary {
            status: session.status,
            started_at: session.started_at,
            ended_at: session.ended_at,
            duration_seconds: end.signed_duration_since(session.started_at).num_seconds(),
            data_points: session.comfort_history.len(),
            final_score: session.latest_score.as_ref().map(|s| s.score),
            final_trend: session.trend(),
            automatic_adjustments: adjustments
                .iter()
                .filter(|a| a.adjustment_type == AdjustmentType::Automatic)
                .count(),
            manual_adjustments: adjustments
                .iter()
                .filter(|a| a.adjustment_type == AdjustmentType::Manual)
                .count(),
            rollbacks: session.rollback_history.len(),
            initial_settings: session.initial_settings.clone(),
            final_settings: session.current_settings.clone(),
            last_known_good: session.last_known_good.clone(),
        };

        let effectiveness = analyze(&adjustments, session.config.effectiveness.success_threshold);
        let metrics = session.metrics.snapshot();
        let insights = insights(session, &summary, &effectiveness, &metrics);
        let recommendations = recommendations(&summary, &effectiveness, &metrics);

        Self {
            session_id: session.id.clone(),
            summary,
            effectiveness,
            metrics,
            insights,
            recommendations,
            generated_at: at,
        }
    }
}

fn analyze(adjustments: &[&WaveParameterAdjustment], success_threshold: f64) -> EffectivenessAnalysis {
    let scores: Vec<f64> = adjustments.iter().filter_map(|a| a.effectiveness()).collect();

    let mut by_strategy: BTreeMap<StrategyId, (usize, Vec<f64>)> = BTreeMap::new();
    for adjustment in adjustments {
        if let Some(strategy) = &adjustment.strategy {
            let entry = by_strategy.entry(strategy.clone()).or_default();
            entry.0 += 1;
            entry.1.extend(adjustment.effectiveness());
        }
    }

    EffectivenessAnalysis {
        adjustments: adjustments.len(),
        measured: scores.len(),
        successful: scores.iter().filter(|e| **e > success_threshold).count(),
        average_effectiveness: mean(&scores),
        per_strategy: by_strategy
            .into_iter()
            .map(|(strategy, (count, scores))| StrategyEffectiveness {
                strategy,
                adjustments: count,
                measured: scores.len(),
                average_effectiveness: mean(&scores),
            })
            .collect(),
    }
}

fn insights(
    session: &FeedbackSession,
    summary: &SessionSummary,
    effectiveness: &EffectivenessAnalysis,
    metrics: &MetricsSnapshot,
) -> Vec<String> {
    let mut insights = Vec::new();
    let thresholds = &session.thresholds;

    match metrics.average_comfort_score {
        None => insights.push("No comfort data was received".to_string()),
        Some(avg) if avg >= thresholds.target_comfort_score => insights.push(format!(
            "Average comfort {:.1} met the target of {:.1}",
            avg, thresholds.target_comfort_score
        )),
        Some(avg) if avg >= thresholds.minimum_comfort_score => insights.push(format!(
            "Average comfort {:.1} stayed within the envelope but below the target of {:.1}",
            avg, thresholds.target_comfort_score
        )),
        Some(avg) => insights.push(format!(
            "Average comfort {:.1} fell below the minimum of {:.1}",
            avg, thresholds.minimum_comfort_score
        )),
    }

    if let Some(min) = metrics.counters.min_comfort_score {
        if min <= thresholds.critical_comfort_score {
            insights.push(format!("Comfort reached a critical low of {:.1}", min));
        }
    }

    if summary.final_trend.sample_count >= 2 {
        insights.push(format!(
            "Comfort was {} at the end of the session (strength {:.2})",
            summary.final_trend.direction, summary.final_trend.strength
        ));
    }

    if summary.rollbacks > 0 {
        insights.push(format!(
            "{} rollback(s) restored earlier settings",
            summary.rollbacks
        ));
    }

    if let Some(best) = effectiveness
        .per_strategy
        .iter()
        .filter(|s| s.average_effectiveness.is_some())
        .max_by(|a, b| {
            a.average_effectiveness
                .partial_cmp(&b.average_effectiveness)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    {
        if let Some(avg) = best.average_effectiveness {
            insights.push(format!(
                "Most effective strategy: {} (average effectiveness {:.2})",
                best.strategy, avg
            ));
        }
    }

    insights
}

fn recommendations(
    summary: &SessionSummary,
    effectiveness: &EffectivenessAnalysis,
    metrics: &MetricsSnapshot,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    if summary.rollbacks > 0 {
        recommendations.push(
            "Review the starting settings: comfort collapsed during the session".to_string(),
        );
    }

    for strategy in &effectiveness.per_strategy {
        if let Some(avg) = strategy.average_effectiveness {
            if avg < POOR_EFFECTIVENESS {
                recommendations.push(format!(
                    "Retune or disable strategy {}: it lowered comfort on average",
                    strategy.strategy
                ));
            }
        }
    }

    if metrics.counters.adjustments_failed > 0 {
        recommendations.push(format!(
            "{} candidate(s) were rejected by the settings validator; check parameter ranges",
            metrics.counters.adjustments_failed
        ));
    }

    if metrics.counters.policy_rejections > 0 {
        recommendations.push(format!(
            "{} adjustment(s) were refused by rate or budget limits; consider relaxing them",
            metrics.counters.policy_rejections
        ));
    }

    if let Some(good) = &summary.last_known_good {
        if good != &summary.initial_settings {
            recommendations
                .push("Start future sessions from the last known good settings".to_string());
        }
    }

    if recommendations.is_empty() && metrics.counters.validations_failed == 0 {
        recommendations.push("No changes recommended".to_string());
    }

    recommendations
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}
