//! Controller configuration.
//!
//! Configuration is constructed by the caller and handed to the controller;
//! presets for common deployment profiles are available through
//! [`ControllerConfig::for_profile`].

use std::time::Duration;

use comfort_types::{ComfortValidationThresholds, IssueSeverity, MetricType, ParameterRanges};
use serde::{Deserialize, Serialize};

use crate::error::{ControllerError, ControllerResult};

/// Deployment profile used to derive a configuration preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceProfile {
    /// General-purpose defaults
    Standard,
    /// Standalone headset at 72 fps: smaller steps, faster cadence
    Quest3,
    /// Participant studies: stricter envelope, conservative automation
    Research,
    /// Local development: relaxed limits
    Development,
}

impl std::str::FromStr for ExperienceProfile {
    type Err = ControllerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "quest3" | "quest-3" => Ok(Self::Quest3),
            "research" => Ok(Self::Research),
            "development" | "dev" => Ok(Self::Development),
            other => Err(ControllerError::InvalidConfiguration(format!(
                "unknown experience profile: {}",
                other
            ))),
        }
    }
}

/// Complete controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Comfort thresholds copied into each new session.
    pub thresholds: ComfortValidationThresholds,

    /// Adjustment rate and count limits.
    pub limits: AdjustmentLimits,

    /// Trend analysis settings.
    pub trend: TrendConfig,

    /// Effectiveness back-fill settings.
    pub effectiveness: EffectivenessConfig,

    /// Scoring weights.
    pub scoring: ScoringWeights,

    /// Legal range of each wave parameter.
    pub parameter_ranges: ParameterRanges,

    /// Maximum number of concurrently active sessions.
    pub max_active_sessions: usize,

    /// Capacity of the event broadcast buffer.
    pub event_buffer: usize,

    /// Let confident downward predictions trigger adjustments.
    pub predictive_adjustments: bool,

    /// Interval of the periodic re-evaluation tick.
    pub tick_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            thresholds: ComfortValidationThresholds::default(),
            limits: AdjustmentLimits::default(),
            trend: TrendConfig::default(),
            effectiveness: EffectivenessConfig::default(),
            scoring: ScoringWeights::default(),
            parameter_ranges: ParameterRanges::default(),
            max_active_sessions: 64,
            event_buffer: 1024,
            predictive_adjustments: false,
            tick_interval: Duration::from_secs(5),
        }
    }
}

impl ControllerConfig {
    /// Create config tuned for a specific profile.
    pub fn for_profile(profile: ExperienceProfile) -> Self {
        let mut config = Self::default();

        match profile {
            ExperienceProfile::Standard => {}
            ExperienceProfile::Quest3 => {
                // Small, frequent steps: large jumps are visible at 72 fps
                config.limits.max_parameter_change_per_adjustment = 0.1;
                config.limits.min_time_between_adjustments = Duration::from_secs(15);
                config.limits.max_adjustments_per_session = 20;
                config.trend.window_size = 10;
                config.tick_interval = Duration::from_secs(1);
            }
            ExperienceProfile::Research => {
                // Participants: stricter envelope, fewer automated changes
                config.thresholds.minimum_comfort_score = 65.0;
                config.thresholds.critical_comfort_score = 35.0;
                config.limits.max_adjustments_per_session = 5;
                config.limits.min_time_between_adjustments = Duration::from_secs(60);
                config.limits.max_parameter_change_per_adjustment = 0.1;
                config.limits.min_issue_severity = IssueSeverity::Medium;
                config.effectiveness.evaluation_window = 5;
            }
            ExperienceProfile::Development => {
                config.limits.max_adjustments_per_session = 100;
                config.limits.min_time_between_adjustments = Duration::ZERO;
                config.limits.max_consecutive_failed_adjustments = 10;
                config.predictive_adjustments = true;
            }
        }

        config
    }

    /// Check the configuration is coherent.
    pub fn validate(&self) -> ControllerResult<()> {
        self.thresholds
            .validate()
            .map_err(|e| ControllerError::InvalidConfiguration(e.to_string()))?;
        self.parameter_ranges
            .validate()
            .map_err(|e| ControllerError::InvalidConfiguration(e.to_string()))?;
        self.limits.validate()?;
        self.trend.validate()?;
        self.effectiveness.validate()?;
        self.scoring.validate()?;

        if self.max_active_sessions == 0 {
            return Err(ControllerError::InvalidConfiguration(
                "max_active_sessions must be at least 1".to_string(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(ControllerError::InvalidConfiguration(
                "event_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Limits on automatic adjustments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjustmentLimits {
    /// Allow the controller to adjust settings on its own.
    pub enable_automatic_adjustments: bool,

    /// Maximum committed adjustments kept per session.
    pub max_adjustments_per_session: usize,

    /// Minimum time between two committed adjustments.
    pub min_time_between_adjustments: Duration,

    /// Largest change of one parameter in one step, as a fraction of its range.
    pub max_parameter_change_per_adjustment: f64,

    /// Validator rejections in a row that force a rollback.
    pub max_consecutive_failed_adjustments: u32,

    /// Least severe issue that warrants an automatic adjustment.
    pub min_issue_severity: IssueSeverity,
}

impl Default for AdjustmentLimits {
    fn default() -> Self {
        Self {
            enable_automatic_adjustments: true,
            max_adjustments_per_session: 10,
            min_time_between_adjustments: Duration::from_secs(30),
            max_parameter_change_per_adjustment: 0.2,
            max_consecutive_failed_adjustments: 3,
            min_issue_severity: IssueSeverity::Low,
        }
    }
}

impl AdjustmentLimits {
    fn validate(&self) -> ControllerResult<()> {
        let change = self.max_parameter_change_per_adjustment;
        if !(change > 0.0 && change <= 1.0) {
            return Err(ControllerError::InvalidConfiguration(format!(
                "max_parameter_change_per_adjustment must be in (0, 1], got {}",
                change
            )));
        }
        if self.max_consecutive_failed_adjustments == 0 {
            return Err(ControllerError::InvalidConfiguration(
                "max_consecutive_failed_adjustments must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trend analysis configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Number of recent scores kept in the analysis window.
    pub window_size: usize,

    /// Score change between window endpoints treated as noise.
    pub noise_threshold: f64,

    /// Number of samples ahead a prediction extrapolates.
    pub prediction_horizon: usize,

    /// Samples required before extrapolating.
    pub min_samples_for_prediction: usize,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            window_size: 8,
            noise_threshold: 5.0,
            prediction_horizon: 3,
            min_samples_for_prediction: 3,
        }
    }
}

impl TrendConfig {
    fn validate(&self) -> ControllerResult<()> {
        if self.window_size < 2 {
            return Err(ControllerError::InvalidConfiguration(
                "trend window_size must be at least 2".to_string(),
            ));
        }
        if !(self.noise_threshold >= 0.0) {
            return Err(ControllerError::InvalidConfiguration(
                "trend noise_threshold must be non-negative".to_string(),
            ));
        }
        if self.prediction_horizon == 0 || self.min_samples_for_prediction < 2 {
            return Err(ControllerError::InvalidConfiguration(
                "prediction needs a horizon of at least 1 and at least 2 samples".to_string(),
            ));
        }
        Ok(())
    }
}

/// How adjustment effectiveness is measured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectivenessConfig {
    /// Data points after an adjustment used to measure its effect.
    pub evaluation_window: usize,

    /// Effectiveness above which settings become last-known-good.
    pub success_threshold: f64,

    /// Score improvement (points) that maps to full effectiveness.
    pub full_scale_improvement: f64,
}

impl Default for EffectivenessConfig {
    fn default() -> Self {
        Self {
            evaluation_window: 3,
            success_threshold: 0.7,
            full_scale_improvement: 20.0,
        }
    }
}

impl EffectivenessConfig {
    fn validate(&self) -> ControllerResult<()> {
        if self.evaluation_window == 0 {
            return Err(ControllerError::InvalidConfiguration(
                "effectiveness evaluation_window must be at least 1".to_string(),
            ));
        }
        if !(self.success_threshold > 0.0 && self.success_threshold < 1.0) {
            return Err(ControllerError::InvalidConfiguration(format!(
                "effectiveness success_threshold must be in (0, 1), got {}",
                self.success_threshold
            )));
        }
        if !(self.full_scale_improvement > 0.0) {
            return Err(ControllerError::InvalidConfiguration(
                "effectiveness full_scale_improvement must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Map a score improvement to an effectiveness in `[0, 1]`.
    ///
    /// No change maps to 0.5; `full_scale_improvement` points map to 1.0.
    pub fn effectiveness_for(&self, improvement: f64) -> f64 {
        (0.5 + 0.5 * improvement / self.full_scale_improvement).clamp(0.0, 1.0)
    }
}

/// Weights of each metric channel in the aggregate comfort score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub overall_comfort: f64,
    pub motion_sickness: f64,
    pub physiological_stress: f64,
    pub behavioral_indicators: f64,
    pub subjective_rating: f64,
    pub eye_strain: f64,
    pub disorientation: f64,
    pub cognitive_load: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            overall_comfort: 0.30,
            motion_sickness: 0.20,
            physiological_stress: 0.10,
            behavioral_indicators: 0.10,
            subjective_rating: 0.15,
            eye_strain: 0.05,
            disorientation: 0.05,
            cognitive_load: 0.05,
        }
    }
}

impl ScoringWeights {
    pub fn weight(&self, metric: MetricType) -> f64 {
        match metric {
            MetricType::OverallComfort => self.overall_comfort,
            MetricType::MotionSickness => self.motion_sickness,
            MetricType::PhysiologicalStress => self.physiological_stress,
            MetricType::BehavioralIndicators => self.behavioral_indicators,
            MetricType::SubjectiveRating => self.subjective_rating,
            MetricType::EyeStrain => self.eye_strain,
            MetricType::Disorientation => self.disorientation,
            MetricType::CognitiveLoad => self.cognitive_load,
        }
    }

    fn validate(&self) -> ControllerResult<()> {
        let weights: Vec<f64> = MetricType::ALL.iter().map(|m| self.weight(*m)).collect();
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ControllerError::InvalidConfiguration(
                "scoring weights must be finite and non-negative".to_string(),
            ));
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err(ControllerError::InvalidConfiguration(
                "at least one scoring weight must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
