//! Comfort validation thresholds
//!
//! Thresholds are configuration. A session keeps its own copy; reconfiguring
//! it only affects evaluations made afterwards.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TypesError;
use crate::measurement::{MetricPolarity, MetricType};

/// Threshold for one metric channel.
///
/// For comfort-oriented metrics `limit` is a minimum and `critical` lies below
/// it; for burden-oriented metrics `limit` is a maximum and `critical` lies
/// above it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricThreshold {
    pub limit: f64,
    pub critical: f64,
    pub target: f64,
}

impl MetricThreshold {
    pub fn new(limit: f64, critical: f64, target: f64) -> Self {
        Self {
            limit,
            critical,
            target,
        }
    }

    fn validate(&self, metric: MetricType) -> Result<(), TypesError> {
        let invalid = |reason: &str| TypesError::InvalidThreshold {
            metric: metric.to_string(),
            reason: reason.to_string(),
        };

        if ![self.limit, self.critical, self.target]
            .iter()
            .all(|v| v.is_finite() && (0.0..=100.0).contains(v))
        {
            return Err(invalid("values must lie within 0-100"));
        }

        match metric.polarity() {
            MetricPolarity::HigherIsBetter => {
                if self.critical >= self.limit {
                    return Err(invalid("critical must be below the minimum"));
                }
                if self.target < self.limit {
                    return Err(invalid("target must not be below the minimum"));
                }
            }
            MetricPolarity::LowerIsBetter => {
                if self.critical <= self.limit {
                    return Err(invalid("critical must be above the maximum"));
                }
                if self.target > self.limit {
                    return Err(invalid("target must not be above the maximum"));
                }
            }
        }
        Ok(())
    }
}

/// Per-metric minimum/critical/target values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComfortValidationThresholds {
    /// Aggregate comfort score below which the session is out of envelope
    pub minimum_comfort_score: f64,

    /// Aggregate comfort score at or below which a rollback is mandatory
    pub critical_comfort_score: f64,

    /// Aggregate comfort score the controller steers towards
    pub target_comfort_score: f64,

    /// Thresholds for individual sub-scores
    pub metrics: BTreeMap<MetricType, MetricThreshold>,
}

impl ComfortValidationThresholds {
    /// Threshold of the aggregate comfort score, expressed as a metric threshold.
    pub fn overall(&self) -> MetricThreshold {
        MetricThreshold::new(
            self.minimum_comfort_score,
            self.critical_comfort_score,
            self.target_comfort_score,
        )
    }

    /// Threshold for a sub-score.
    pub fn for_metric(&self, metric: MetricType) -> Option<MetricThreshold> {
        match metric {
            MetricType::OverallComfort => Some(self.overall()),
            other => self.metrics.get(&other).copied(),
        }
    }

    pub fn with_metric(mut self, metric: MetricType, threshold: MetricThreshold) -> Self {
        self.metrics.insert(metric, threshold);
        self
    }

    pub fn validate(&self) -> Result<(), TypesError> {
        self.overall().validate(MetricType::OverallComfort)?;
        for (metric, threshold) in &self.metrics {
            if *metric == MetricType::OverallComfort {
                return Err(TypesError::InvalidThreshold {
                    metric: metric.to_string(),
                    reason: "configured through the aggregate comfort fields".to_string(),
                });
            }
            threshold.validate(*metric)?;
        }
        Ok(())
    }
}

impl Default for ComfortValidationThresholds {
    fn default() -> Self {
        let metrics = [
            (MetricType::MotionSickness, MetricThreshold::new(40.0, 70.0, 15.0)),
            (MetricType::PhysiologicalStress, MetricThreshold::new(50.0, 80.0, 25.0)),
            (MetricType::BehavioralIndicators, MetricThreshold::new(50.0, 80.0, 20.0)),
            (MetricType::SubjectiveRating, MetricThreshold::new(50.0, 20.0, 70.0)),
            (MetricType::EyeStrain, MetricThreshold::new(45.0, 75.0, 20.0)),
            (MetricType::Disorientation, MetricThreshold::new(40.0, 70.0, 15.0)),
            (MetricType::CognitiveLoad, MetricThreshold::new(60.0, 85.0, 40.0)),
        ];

        Self {
            minimum_comfort_score: 60.0,
            critical_comfort_score: 30.0,
            target_comfort_score: 80.0,
            metrics: metrics.into_iter().collect(),
        }
    }
}
