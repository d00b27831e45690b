//! Comfort Types - Core value types for the comfort feedback loop
//!
//! The comfort loop keeps an interactive wave experience inside a comfort
//! envelope by scoring incoming comfort measurements and nudging a small vector
//! of wave parameters.
//!
//! ## Key Concepts
//!
//! - **ComfortDataPoint**: one validated measurement from the data-collection side
//! - **WaveMatrixSettings**: the parameter vector driving the experience
//! - **ComfortIssue**: a typed, severity-ranked comfort problem
//! - **AdjustmentStrategy**: prioritized rule set mapping issues to parameter changes
//! - **WaveParameterAdjustment**: immutable record of a committed settings change
//! - **ComfortValidationThresholds**: per-metric minimum/critical/target values

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod adjustment;
pub mod error;
pub mod ids;
pub mod issue;
pub mod measurement;
pub mod session;
pub mod settings;
pub mod strategy;
pub mod thresholds;

// Re-export main types
pub use adjustment::{AdjustmentType, WaveParameterAdjustment};
pub use error::TypesError;
pub use ids::{AdjustmentId, DataPointId, IssueId, SessionId, StrategyId};
pub use issue::{ComfortIssue, IssueSeverity, IssueType};
pub use measurement::{
    ComfortDataPoint, ComfortReadings, MeasurementMethod, MetricPolarity, MetricType,
};
pub use session::{SessionStatus, StopReason};
pub use settings::{ParameterChange, ParameterRange, ParameterRanges, WaveMatrixSettings, WaveParameter};
pub use strategy::{AdjustmentRule, AdjustmentStrategy, RuleAction};
pub use thresholds::{ComfortValidationThresholds, MetricThreshold};
