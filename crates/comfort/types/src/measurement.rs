//! Comfort measurements pushed by the data-collection collaborator
//!
//! A [`ComfortDataPoint`] is immutable once received. Each channel in
//! [`ComfortReadings`] is optional; the scorer treats a missing channel as
//! neutral.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::DataPointId;

/// How a measurement was acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeasurementMethod {
    /// In-experience questionnaire (e.g. SSQ, comfort rating)
    Questionnaire,
    /// Physiological sensors (heart rate, EDA, ...)
    Physiological,
    /// Behavioral telemetry (head motion, interaction patterns)
    Behavioral,
    /// Fused from several sources
    Combined,
}

/// Direction in which a metric gets worse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricPolarity {
    /// Comfort-oriented metric: violated when below its minimum
    HigherIsBetter,
    /// Burden-oriented metric: violated when above its maximum
    LowerIsBetter,
}

/// Metric channels the scorer produces sub-scores for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetricType {
    OverallComfort,
    MotionSickness,
    PhysiologicalStress,
    BehavioralIndicators,
    SubjectiveRating,
    EyeStrain,
    Disorientation,
    CognitiveLoad,
}

impl MetricType {
    pub const ALL: [MetricType; 8] = [
        MetricType::OverallComfort,
        MetricType::MotionSickness,
        MetricType::PhysiologicalStress,
        MetricType::BehavioralIndicators,
        MetricType::SubjectiveRating,
        MetricType::EyeStrain,
        MetricType::Disorientation,
        MetricType::CognitiveLoad,
    ];

    pub fn polarity(&self) -> MetricPolarity {
        match self {
            MetricType::OverallComfort | MetricType::SubjectiveRating => {
                MetricPolarity::HigherIsBetter
            }
            _ => MetricPolarity::LowerIsBetter,
        }
    }
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MetricType::OverallComfort => "overall_comfort",
            MetricType::MotionSickness => "motion_sickness",
            MetricType::PhysiologicalStress => "physiological_stress",
            MetricType::BehavioralIndicators => "behavioral_indicators",
            MetricType::SubjectiveRating => "subjective_rating",
            MetricType::EyeStrain => "eye_strain",
            MetricType::Disorientation => "disorientation",
            MetricType::CognitiveLoad => "cognitive_load",
        };
        f.write_str(name)
    }
}

/// Raw per-channel values of one measurement.
///
/// Every channel is on a 0-100 scale except `subjective_rating`, which is the
/// participant's 0-10 rating.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComfortReadings {
    /// Overall comfort (higher = more comfortable)
    pub overall_comfort: Option<f64>,
    /// Motion sickness burden (higher = worse)
    pub motion_sickness: Option<f64>,
    /// Physiological stress (higher = worse)
    pub physiological_stress: Option<f64>,
    /// Behavioral discomfort indicators (higher = worse)
    pub behavioral_discomfort: Option<f64>,
    /// Subjective 0-10 rating (higher = more comfortable)
    pub subjective_rating: Option<f64>,
    /// Eye strain (higher = worse)
    pub eye_strain: Option<f64>,
    /// Disorientation (higher = worse)
    pub disorientation: Option<f64>,
    /// Cognitive load (higher = worse)
    pub cognitive_load: Option<f64>,
}

impl ComfortReadings {
    /// Readings carrying only an overall comfort value.
    pub fn overall(value: f64) -> Self {
        Self {
            overall_comfort: Some(value),
            ..Self::default()
        }
    }

    /// Raw value for a metric channel.
    pub fn get(&self, metric: MetricType) -> Option<f64> {
        match metric {
            MetricType::OverallComfort => self.overall_comfort,
            MetricType::MotionSickness => self.motion_sickness,
            MetricType::PhysiologicalStress => self.physiological_stress,
            MetricType::BehavioralIndicators => self.behavioral_discomfort,
            MetricType::SubjectiveRating => self.subjective_rating,
            MetricType::EyeStrain => self.eye_strain,
            MetricType::Disorientation => self.disorientation,
            MetricType::CognitiveLoad => self.cognitive_load,
        }
    }

    /// Number of channels present.
    pub fn present_count(&self) -> usize {
        MetricType::ALL
            .iter()
            .filter(|m| self.get(**m).is_some())
            .count()
    }

    /// Whether every present channel is a finite number.
    pub fn all_finite(&self) -> bool {
        MetricType::ALL
            .iter()
            .filter_map(|m| self.get(*m))
            .all(f64::is_finite)
    }
}

/// A single validated comfort measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComfortDataPoint {
    pub id: DataPointId,

    /// When the measurement was taken
    pub timestamp: DateTime<Utc>,

    /// Acquisition method
    pub method: MeasurementMethod,

    /// Raw per-channel values
    pub readings: ComfortReadings,

    /// Producer-assigned quality indicator (0.0-1.0)
    pub quality: f64,
}

impl ComfortDataPoint {
    pub fn new(timestamp: DateTime<Utc>, method: MeasurementMethod, readings: ComfortReadings) -> Self {
        Self {
            id: DataPointId::generate(),
            timestamp,
            method,
            readings,
            quality: 1.0,
        }
    }

    pub fn with_quality(mut self, quality: f64) -> Self {
        self.quality = quality;
        self
    }
}
