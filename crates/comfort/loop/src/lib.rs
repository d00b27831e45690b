//! # Comfort Loop - Adaptive Comfort Controller
//!
//! Closed-loop controller that keeps an interactive wave experience inside a
//! comfort envelope. Each session scores incoming comfort measurements,
//! tracks their trend, detects comfort issues against thresholds and makes
//! small, validated changes to the session's wave parameters.
//!
//! ## Safety Envelope
//!
//! - Automatic adjustments are bounded per session and rate limited
//! - Each parameter moves at most a fixed fraction of its range per step
//! - Every candidate passes an external [`SettingsValidator`] before commit
//! - A safety-critical reading rolls the session back to its last known
//!   good (or initial) settings, outside any rate limit
//!
//! ## Key Components
//!
//! - [`FeedbackLoopController`]: session registry and processing cycle
//! - [`ComfortScorer`]: weighted 0-100 comfort score
//! - [`TrendAnalyzer`]: sliding-window trend and short-horizon prediction
//! - [`IssueDetector`]: threshold validation and issue typing
//! - [`StrategyLibrary`]: prioritized parameter strategies
//! - [`TickScheduler`]: periodic re-evaluation
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use comfort_loop::{ControllerConfig, FeedbackLoopController, PermissiveSettingsValidator};
//! use comfort_types::{ComfortDataPoint, ComfortReadings, MeasurementMethod, WaveMatrixSettings};
//!
//! # async fn example() {
//! let controller = FeedbackLoopController::with_system_clock(
//!     ControllerConfig::default(),
//!     Arc::new(PermissiveSettingsValidator),
//! )
//! .unwrap();
//!
//! let started = controller.start_feedback_loop(WaveMatrixSettings::default()).await;
//! let session_id = started.session_id.unwrap();
//!
//! let point = ComfortDataPoint::new(
//!     chrono::Utc::now(),
//!     MeasurementMethod::Questionnaire,
//!     ComfortReadings::overall(55.0),
//! );
//! let result = controller.process_comfort_data(&session_id, point).await;
//! println!("adjusted: {}", result.adjusted());
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod adjuster;
pub mod clock;
pub mod config;
pub mod controller;
pub mod detection;
pub mod effectiveness;
pub mod error;
pub mod events;
pub mod metrics;
pub mod report;
pub mod results;
pub mod rollback;
pub mod scheduler;
pub mod scoring;
pub mod session;
pub mod strategy;
pub mod trend;
pub mod validator;

pub use adjuster::{AdjustmentOutcome, ParameterAdjustmentResult};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    AdjustmentLimits, ControllerConfig, EffectivenessConfig, ExperienceProfile, ScoringWeights,
    TrendConfig,
};
pub use controller::FeedbackLoopController;
pub use detection::{ComfortValidationResult, ComfortValidationViolation, IssueDetector, TrendWarning};
pub use effectiveness::EffectivenessUpdate;
pub use error::{ControllerError, ControllerResult};
pub use events::{EventSeverity, FeedbackEvent, FeedbackEventEnvelope};
pub use metrics::{FeedbackLoopMetrics, MetricsSnapshot};
pub use report::{EffectivenessAnalysis, FeedbackReport, SessionSummary, StrategyEffectiveness};
pub use results::{ProcessingResult, StartResult, StatusChangeResult, StopResult, TickReport};
pub use rollback::{RollbackResult, RollbackTarget};
pub use scheduler::{spawn_scheduler, TickScheduler};
pub use scoring::{ComfortScore, ComfortScorer, NEUTRAL_SCORE};
pub use session::SessionSnapshot;
pub use strategy::StrategyLibrary;
pub use trend::{ComfortPrediction, ComfortTrend, TrendAnalyzer, TrendDirection};
pub use validator::{
    PermissiveSettingsValidator, RangeSettingsValidator, RejectingSettingsValidator,
    SettingsValidator, SettingsVerdict,
};
