//! Trend analysis over a sliding window of comfort scores.
//!
//! Each session owns a [`ScoreWindow`]; the [`TrendAnalyzer`] reads it to
//! classify the direction and strength of recent change and to extrapolate a
//! short-horizon prediction. Degenerate inputs produce low-confidence neutral
//! answers rather than errors.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TrendConfig;
use crate::scoring::NEUTRAL_SCORE;

/// Confidence attached to predictions made from too few samples.
const LOW_CONFIDENCE: f64 = 0.1;

/// Direction of comfort change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    Improving,
    Stable,
    Declining,
    Fluctuating,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendDirection::Improving => write!(f, "improving"),
            TrendDirection::Stable => write!(f, "stable"),
            TrendDirection::Declining => write!(f, "declining"),
            TrendDirection::Fluctuating => write!(f, "fluctuating"),
        }
    }
}

/// A scored sample in the window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendSample {
    pub score: f64,
    pub timestamp: DateTime<Utc>,
}

/// Bounded, time-ordered window of recent scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreWindow {
    samples: VecDeque<TrendSample>,
    capacity: usize,
}

impl ScoreWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest beyond capacity.
    pub fn push(&mut self, score: f64, timestamp: DateTime<Utc>) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(TrendSample { score, timestamp });
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&TrendSample> {
        self.samples.back()
    }

    pub fn scores(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.score)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Classified trend of a session's comfort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComfortTrend {
    pub direction: TrendDirection,

    /// Confidence in the directional read (0.0-1.0).
    pub strength: f64,

    /// Score change between window endpoints.
    pub delta: f64,

    /// Standard deviation of the window around its linear fit.
    pub residual_std: f64,

    pub sample_count: usize,
}

impl ComfortTrend {
    fn neutral(sample_count: usize) -> Self {
        Self {
            direction: TrendDirection::Stable,
            strength: 0.0,
            delta: 0.0,
            residual_std: 0.0,
            sample_count,
        }
    }
}

/// Short-horizon comfort prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComfortPrediction {
    /// Score expected `horizon` samples ahead.
    pub predicted_score: f64,

    /// Score change per sample used for the extrapolation.
    pub delta_per_sample: f64,

    /// Samples ahead.
    pub horizon: usize,

    /// Confidence (0.0-1.0); grows with sample count, shrinks with variance.
    pub confidence: f64,
}

/// Stateless trend analyzer.
#[derive(Debug, Clone)]
pub struct TrendAnalyzer {
    config: TrendConfig,
}

impl TrendAnalyzer {
    pub fn new(config: TrendConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrendConfig {
        &self.config
    }

    /// Create an empty window sized for this analyzer.
    pub fn window(&self) -> ScoreWindow {
        ScoreWindow::new(self.config.window_size)
    }

    /// Classify the direction and strength of change in the window.
    pub fn analyze(&self, window: &ScoreWindow) -> ComfortTrend {
        let scores: Vec<f64> = window.scores().collect();
        if scores.len() < 2 {
            return ComfortTrend::neutral(scores.len());
        }

        let delta = scores[scores.len() - 1] - scores[0];
        let residual_std = residual_std(&scores);
        let noise = self.config.noise_threshold;

        let direction = if delta > noise {
            TrendDirection::Improving
        } else if delta < -noise {
            TrendDirection::Declining
        } else if residual_std > noise.max(f64::EPSILON) {
            TrendDirection::Fluctuating
        } else {
            TrendDirection::Stable
        };

        ComfortTrend {
            direction,
            strength: self.variance_factor(residual_std),
            delta,
            residual_std,
            sample_count: scores.len(),
        }
    }

    /// Extrapolate the most recent per-sample change over the prediction horizon.
    pub fn predict(&self, window: &ScoreWindow) -> ComfortPrediction {
        let scores: Vec<f64> = window.scores().collect();
        let horizon = self.config.prediction_horizon;

        if scores.len() < self.config.min_samples_for_prediction {
            return ComfortPrediction {
                predicted_score: scores.last().copied().unwrap_or(NEUTRAL_SCORE),
                delta_per_sample: 0.0,
                horizon,
                confidence: LOW_CONFIDENCE,
            };
        }

        let last = scores[scores.len() - 1];
        let delta_per_sample = last - scores[scores.len() - 2];
        let predicted_score = (last + delta_per_sample * horizon as f64).clamp(0.0, 100.0);

        let sample_factor = (scores.len() as f64 / self.config.window_size as f64).min(1.0);
        let confidence = (sample_factor * self.variance_factor(residual_std(&scores)))
            .clamp(LOW_CONFIDENCE, 1.0);

        ComfortPrediction {
            predicted_score,
            delta_per_sample,
            horizon,
            confidence,
        }
    }

    /// Map residual spread to a confidence factor in (0, 1].
    fn variance_factor(&self, residual_std: f64) -> f64 {
        let scale = self.config.noise_threshold.max(1.0);
        1.0 / (1.0 + residual_std / scale)
    }
}

impl Default for TrendAnalyzer {
    fn default() -> Self {
        Self::new(TrendConfig::default())
    }
}

/// Standard deviation of `scores` around their least-squares line.
fn residual_std(scores: &[f64]) -> f64 {
    let n = scores.len();
    if n < 3 {
        return 0.0;
    }

    let n_f = n as f64;
    let mean_x = (n_f - 1.0) / 2.0;
    let mean_y = scores.iter().sum::<f64>() / n_f;

    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (i, y) in scores.iter().enumerate() {
        let dx = i as f64 - mean_x;
        sxy += dx * (y - mean_y);
        sxx += dx * dx;
    }
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    let intercept = mean_y - slope * mean_x;

    let sse: f64 = scores
        .iter()
        .enumerate()
        .map(|(i, y)| {
            let fitted = intercept + slope * i as f64;
            (y - fitted).powi(2)
        })
        .sum();

    (sse / n_f).sqrt()
}
