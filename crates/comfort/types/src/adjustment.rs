//! Wave parameter adjustment records
//!
//! An adjustment is immutable once created, except that its effectiveness
//! score is back-filled exactly once when enough later data exists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AdjustmentId, StrategyId};
use crate::issue::ComfortIssue;
use crate::settings::WaveMatrixSettings;

/// Origin of an adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdjustmentType {
    /// Proposed by the controller from detected issues
    Automatic,
    /// Supplied by an external, authorized operator
    Manual,
    /// Reversion to a previously proven state
    Rollback,
    /// Safety reversion requested by the host
    Emergency,
}

impl std::fmt::Display for AdjustmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdjustmentType::Automatic => write!(f, "automatic"),
            AdjustmentType::Manual => write!(f, "manual"),
            AdjustmentType::Rollback => write!(f, "rollback"),
            AdjustmentType::Emergency => write!(f, "emergency"),
        }
    }
}

/// A committed change of the session's wave settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveParameterAdjustment {
    pub id: AdjustmentId,

    pub applied_at: DateTime<Utc>,

    pub adjustment_type: AdjustmentType,

    pub reason: String,

    pub settings_before: WaveMatrixSettings,

    pub settings_after: WaveMatrixSettings,

    /// Issues that triggered the adjustment
    pub triggering_issues: Vec<ComfortIssue>,

    /// Strategy used, if the adjustment was strategy-driven
    pub strategy: Option<StrategyId>,

    /// Comfort score the adjustment is measured against
    pub baseline_score: Option<f64>,

    pub is_automatic: bool,

    effectiveness: Option<f64>,
}

impl WaveParameterAdjustment {
    pub fn new(
        adjustment_type: AdjustmentType,
        reason: impl Into<String>,
        settings_before: WaveMatrixSettings,
        settings_after: WaveMatrixSettings,
        applied_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AdjustmentId::generate(),
            applied_at,
            adjustment_type,
            reason: reason.into(),
            settings_before,
            settings_after,
            triggering_issues: Vec::new(),
            strategy: None,
            baseline_score: None,
            is_automatic: adjustment_type == AdjustmentType::Automatic,
            effectiveness: None,
        }
    }

    pub fn with_issues(mut self, issues: Vec<ComfortIssue>) -> Self {
        self.triggering_issues = issues;
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyId) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_baseline_score(mut self, score: f64) -> Self {
        self.baseline_score = Some(score);
        self
    }

    pub fn effectiveness(&self) -> Option<f64> {
        self.effectiveness
    }

    /// Populate the effectiveness score.
    ///
    /// Returns `false` and leaves the record untouched if a score was already
    /// recorded.
    pub fn record_effectiveness(&mut self, score: f64) -> bool {
        if self.effectiveness.is_some() {
            return false;
        }
        self.effectiveness = Some(score.clamp(0.0, 1.0));
        true
    }
}
