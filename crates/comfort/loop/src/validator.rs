//! External settings validation seam.
//!
//! Every candidate parameter vector is submitted to a [`SettingsValidator`]
//! before it can become a session's current settings. The controller awaits
//! the verdict and commits only accepted candidates.

use async_trait::async_trait;
use comfort_types::{ParameterRanges, WaveMatrixSettings};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ControllerError, ControllerResult};

/// Verdict on a candidate settings vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsVerdict {
    pub valid: bool,
    pub reasons: Vec<String>,
}

impl SettingsVerdict {
    pub fn accept() -> Self {
        Self {
            valid: true,
            reasons: Vec::new(),
        }
    }

    pub fn reject(reasons: Vec<String>) -> Self {
        Self {
            valid: false,
            reasons,
        }
    }
}

/// Structural/numeric check of a candidate settings vector.
#[async_trait]
pub trait SettingsValidator: Send + Sync {
    /// Validate a candidate. An `Err` counts as a failed adjustment.
    async fn validate(&self, settings: &WaveMatrixSettings) -> ControllerResult<SettingsVerdict>;
}

/// Validator that accepts everything.
pub struct PermissiveSettingsValidator;

#[async_trait]
impl SettingsValidator for PermissiveSettingsValidator {
    async fn validate(&self, settings: &WaveMatrixSettings) -> ControllerResult<SettingsVerdict> {
        debug!(parameters = settings.len(), "Permissive validator accepting settings");
        Ok(SettingsVerdict::accept())
    }
}

/// Validator that rejects every candidate, or fails outright.
pub struct RejectingSettingsValidator {
    reason: String,
    error: bool,
}

impl RejectingSettingsValidator {
    /// Reject every candidate with `reason`.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            error: false,
        }
    }

    /// Fail every validation call instead of returning a verdict.
    pub fn erroring(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            error: true,
        }
    }
}

#[async_trait]
impl SettingsValidator for RejectingSettingsValidator {
    async fn validate(&self, _settings: &WaveMatrixSettings) -> ControllerResult<SettingsVerdict> {
        if self.error {
            return Err(ControllerError::Validator(self.reason.clone()));
        }
        Ok(SettingsVerdict::reject(vec![self.reason.clone()]))
    }
}

/// Validator enforcing finiteness and configured parameter ranges.
pub struct RangeSettingsValidator {
    ranges: ParameterRanges,
}

impl RangeSettingsValidator {
    pub fn new(ranges: ParameterRanges) -> Self {
        Self { ranges }
    }
}

impl Default for RangeSettingsValidator {
    fn default() -> Self {
        Self::new(ParameterRanges::default())
    }
}

#[async_trait]
impl SettingsValidator for RangeSettingsValidator {
    async fn validate(&self, settings: &WaveMatrixSettings) -> ControllerResult<SettingsVerdict> {
        let mut reasons = Vec::new();

        if let Err(e) = settings.check_finite() {
            reasons.push(e.to_string());
        }
        for (parameter, value) in settings.iter() {
            if let Some(range) = self.ranges.get(parameter) {
                if value.is_finite() && !range.contains(value) {
                    reasons.push(format!(
                        "{} = {} outside [{}, {}]",
                        parameter, value, range.min, range.max
                    ));
                }
            }
        }

        if reasons.is_empty() {
            Ok(SettingsVerdict::accept())
        } else {
            Ok(SettingsVerdict::reject(reasons))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comfort_types::WaveParameter;

    #[tokio::test]
    async fn test_permissive_accepts() {
        let verdict = PermissiveSettingsValidator
            .validate(&WaveMatrixSettings::default())
            .await
            .unwrap();
        assert!(verdict.valid);
    }

    #[tokio::test]
    async fn test_rejecting_rejects_with_reason() {
        let verdict = RejectingSettingsValidator::new("engine busy")
            .validate(&WaveMatrixSettings::default())
            .await
            .unwrap();
        assert!(!verdict.valid);
        assert_eq!(verdict.reasons, vec!["engine busy".to_string()]);
    }

    #[tokio::test]
    async fn test_erroring_returns_validator_error() {
        let result = RejectingSettingsValidator::erroring("unreachable")
            .validate(&WaveMatrixSettings::default())
            .await;
        assert!(matches!(result, Err(ControllerError::Validator(_))));
    }

    #[tokio::test]
    async fn test_range_validator() {
        let validator = RangeSettingsValidator::default();

        let ok = validator.validate(&WaveMatrixSettings::default()).await.unwrap();
        assert!(ok.valid);

        let too_fast = WaveMatrixSettings::default().with(WaveParameter::Speed, 9.0);
        let verdict = validator.validate(&too_fast).await.unwrap();
        assert!(!verdict.valid);
        assert!(verdict.reasons[0].contains("speed"));

        let nan = WaveMatrixSettings::default().with(WaveParameter::Phase, f64::NAN);
        assert!(!validator.validate(&nan).await.unwrap().valid);
    }
}
