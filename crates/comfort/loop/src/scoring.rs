//! Comfort scoring.
//!
//! Reduces one [`ComfortDataPoint`] to an aggregate 0-100 comfort score plus a
//! sub-score per metric channel. Pure function of its input and weights.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use comfort_types::{ComfortDataPoint, DataPointId, MetricPolarity, MetricType};
use serde::{Deserialize, Serialize};

use crate::config::ScoringWeights;

/// Score reported when no channel carries information.
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Scored measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComfortScore {
    /// Aggregate comfort (0-100, higher = more comfortable).
    pub score: f64,

    /// Sub-score per present channel, in the channel's own orientation (0-100).
    pub sub_scores: BTreeMap<MetricType, f64>,

    /// Fraction of the total scoring weight carried by present channels.
    pub coverage: f64,

    /// Coverage scaled by the producer's quality indicator (0.0-1.0).
    pub confidence: f64,

    pub data_point: DataPointId,

    pub timestamp: DateTime<Utc>,
}

impl ComfortScore {
    pub fn sub_score(&self, metric: MetricType) -> Option<f64> {
        self.sub_scores.get(&metric).copied()
    }
}

/// Weighted comfort scorer.
#[derive(Debug, Clone)]
pub struct ComfortScorer {
    weights: ScoringWeights,
}

impl ComfortScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    /// Score a data point.
    ///
    /// Missing or non-finite channels are left out and the remaining weights
    /// renormalized, so an absent channel never drags the score down.
    pub fn score(&self, point: &ComfortDataPoint) -> ComfortScore {
        let mut sub_scores = BTreeMap::new();
        let mut weighted_sum = 0.0;
        let mut present_weight = 0.0;
        let total_weight: f64 = MetricType::ALL.iter().map(|m| self.weights.weight(*m)).sum();

        for metric in MetricType::ALL {
            let Some(raw) = point.readings.get(metric).filter(|v| v.is_finite()) else {
                continue;
            };

            let sub_score = normalize(metric, raw);
            sub_scores.insert(metric, sub_score);

            let weight = self.weights.weight(metric);
            weighted_sum += comfort_contribution(metric, sub_score) * weight;
            present_weight += weight;
        }

        let score = if present_weight > 0.0 {
            (weighted_sum / present_weight).clamp(0.0, 100.0)
        } else {
            NEUTRAL_SCORE
        };

        let coverage = if total_weight > 0.0 {
            (present_weight / total_weight).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let quality = if point.quality.is_finite() {
            point.quality.clamp(0.0, 1.0)
        } else {
            0.0
        };

        ComfortScore {
            score,
            sub_scores,
            coverage,
            confidence: coverage * quality,
            data_point: point.id.clone(),
            timestamp: point.timestamp,
        }
    }
}

impl Default for ComfortScorer {
    fn default() -> Self {
        Self::new(ScoringWeights::default())
    }
}

/// Bring a raw channel value onto the 0-100 scale.
fn normalize(metric: MetricType, raw: f64) -> f64 {
    let value = match metric {
        // 0-10 rating
        MetricType::SubjectiveRating => raw * 10.0,
        _ => raw,
    };
    value.clamp(0.0, 100.0)
}

/// Contribution of a sub-score to the comfort aggregate (higher = better).
fn comfort_contribution(metric: MetricType, sub_score: f64) -> f64 {
    match metric.polarity() {
        MetricPolarity::HigherIsBetter => sub_score,
        MetricPolarity::LowerIsBetter => 100.0 - sub_score,
    }
}
