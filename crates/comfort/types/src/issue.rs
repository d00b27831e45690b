//! Comfort issues raised by the detector

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{DataPointId, IssueId};
use crate::measurement::MetricType;

/// Category of comfort problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IssueType {
    MotionSickness,
    Disorientation,
    EyeStrain,
    PhysiologicalStress,
    BehavioralDiscomfort,
    CognitiveOverload,
}

impl IssueType {
    /// Issue raised when `metric` violates its threshold.
    ///
    /// Overall comfort shortfalls are attributed to motion, the primary driver
    /// of discomfort in a wave experience; a low subjective rating is treated as
    /// behavioral discomfort.
    pub fn for_metric(metric: MetricType) -> IssueType {
        match metric {
            MetricType::OverallComfort | MetricType::MotionSickness => IssueType::MotionSickness,
            MetricType::PhysiologicalStress => IssueType::PhysiologicalStress,
            MetricType::BehavioralIndicators | MetricType::SubjectiveRating => {
                IssueType::BehavioralDiscomfort
            }
            MetricType::EyeStrain => IssueType::EyeStrain,
            MetricType::Disorientation => IssueType::Disorientation,
            MetricType::CognitiveLoad => IssueType::CognitiveOverload,
        }
    }
}

impl std::fmt::Display for IssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Issue severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl IssueSeverity {
    /// Bucket a relative deviation from a threshold.
    ///
    /// `<10%` Low, `<30%` Medium, `<50%` High, otherwise Critical.
    pub fn from_relative_deviation(deviation: f64) -> Self {
        let deviation = deviation.abs();
        if deviation < 0.10 {
            IssueSeverity::Low
        } else if deviation < 0.30 {
            IssueSeverity::Medium
        } else if deviation < 0.50 {
            IssueSeverity::High
        } else {
            IssueSeverity::Critical
        }
    }

    /// Multiplier applied to severity-scaled adjustment rules.
    pub fn scale_factor(&self) -> f64 {
        match self {
            IssueSeverity::Low => 0.5,
            IssueSeverity::Medium => 1.0,
            IssueSeverity::High => 1.5,
            IssueSeverity::Critical => 2.0,
        }
    }
}

impl std::fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueSeverity::Low => write!(f, "low"),
            IssueSeverity::Medium => write!(f, "medium"),
            IssueSeverity::High => write!(f, "high"),
            IssueSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// A detected comfort issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComfortIssue {
    pub id: IssueId,

    pub issue_type: IssueType,

    pub severity: IssueSeverity,

    /// Detection confidence (0.0-1.0)
    pub confidence: f64,

    pub detected_at: DateTime<Utc>,

    /// Metric whose threshold was crossed
    pub metric: MetricType,

    /// Whether the issue comes from a trend prediction rather than a measured value
    pub predicted: bool,

    /// Data points that support the detection
    pub data_points: Vec<DataPointId>,
}

impl ComfortIssue {
    pub fn new(
        issue_type: IssueType,
        severity: IssueSeverity,
        metric: MetricType,
        confidence: f64,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: IssueId::generate(),
            issue_type,
            severity,
            confidence: confidence.clamp(0.0, 1.0),
            detected_at,
            metric,
            predicted: false,
            data_points: Vec::new(),
        }
    }

    pub fn with_data_points(mut self, data_points: Vec<DataPointId>) -> Self {
        self.data_points = data_points;
        self
    }

    pub fn predicted(mut self) -> Self {
        self.predicted = true;
        self
    }

    pub fn is_critical(&self) -> bool {
        self.severity == IssueSeverity::Critical
    }
}
