//! Wave matrix settings
//!
//! The parameter vector that drives the live experience. The controller copies,
//! compares and submits it for validation; only adjustment rules look at
//! individual parameters.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypesError;

/// A tunable parameter of the wave matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaveParameter {
    /// Displacement amplitude of the wave field
    Amplitude,
    /// Oscillation frequency (Hz)
    Frequency,
    /// Phase offset (radians)
    Phase,
    /// Propagation speed multiplier
    Speed,
    /// Damping coefficient (0 = undamped)
    Damping,
    /// Visual complexity of the pattern (0-1)
    Complexity,
}

impl WaveParameter {
    /// All parameters, in canonical order.
    pub const ALL: [WaveParameter; 6] = [
        WaveParameter::Amplitude,
        WaveParameter::Frequency,
        WaveParameter::Phase,
        WaveParameter::Speed,
        WaveParameter::Damping,
        WaveParameter::Complexity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WaveParameter::Amplitude => "amplitude",
            WaveParameter::Frequency => "frequency",
            WaveParameter::Phase => "phase",
            WaveParameter::Speed => "speed",
            WaveParameter::Damping => "damping",
            WaveParameter::Complexity => "complexity",
        }
    }
}

impl fmt::Display for WaveParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WaveParameter {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WaveParameter::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TypesError::UnknownParameter(s.to_string()))
    }
}

/// Vector of wave parameter values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveMatrixSettings {
    values: BTreeMap<WaveParameter, f64>,
}

impl WaveMatrixSettings {
    /// Create settings with no parameters set.
    pub fn empty() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Builder-style setter.
    pub fn with(mut self, parameter: WaveParameter, value: f64) -> Self {
        self.values.insert(parameter, value);
        self
    }

    pub fn get(&self, parameter: WaveParameter) -> Option<f64> {
        self.values.get(&parameter).copied()
    }

    pub fn set(&mut self, parameter: WaveParameter, value: f64) {
        self.values.insert(parameter, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (WaveParameter, f64)> + '_ {
        self.values.iter().map(|(p, v)| (*p, *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Check that every value is finite.
    pub fn check_finite(&self) -> Result<(), TypesError> {
        for (parameter, value) in self.iter() {
            if !value.is_finite() {
                return Err(TypesError::NonFiniteValue { parameter, value });
            }
        }
        Ok(())
    }

    /// Parameters whose value differs between `self` and `other`.
    ///
    /// Returns `(parameter, before, after)` where a missing value is `None`.
    pub fn diff(&self, other: &WaveMatrixSettings) -> Vec<ParameterChange> {
        WaveParameter::ALL
            .iter()
            .filter_map(|p| {
                let before = self.get(*p);
                let after = other.get(*p);
                (before != after).then_some(ParameterChange {
                    parameter: *p,
                    before,
                    after,
                })
            })
            .collect()
    }
}

impl Default for WaveMatrixSettings {
    /// A calm baseline pattern.
    fn default() -> Self {
        Self::empty()
            .with(WaveParameter::Amplitude, 1.0)
            .with(WaveParameter::Frequency, 0.5)
            .with(WaveParameter::Phase, 0.0)
            .with(WaveParameter::Speed, 1.0)
            .with(WaveParameter::Damping, 0.3)
            .with(WaveParameter::Complexity, 0.5)
    }
}

/// A single parameter difference between two settings values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterChange {
    pub parameter: WaveParameter,
    pub before: Option<f64>,
    pub after: Option<f64>,
}

/// Legal range of one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterRange {
    pub min: f64,
    pub max: f64,
}

impl ParameterRange {
    pub fn new(parameter: WaveParameter, min: f64, max: f64) -> Result<Self, TypesError> {
        if !min.is_finite() || !max.is_finite() || min >= max {
            return Err(TypesError::InvalidRange {
                parameter,
                min,
                max,
            });
        }
        Ok(Self { min, max })
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Ranges for all tunable parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRanges {
    ranges: BTreeMap<WaveParameter, ParameterRange>,
}

impl ParameterRanges {
    pub fn empty() -> Self {
        Self {
            ranges: BTreeMap::new(),
        }
    }

    pub fn with(
        mut self,
        parameter: WaveParameter,
        min: f64,
        max: f64,
    ) -> Result<Self, TypesError> {
        self.ranges
            .insert(parameter, ParameterRange::new(parameter, min, max)?);
        Ok(self)
    }

    pub fn get(&self, parameter: WaveParameter) -> Option<ParameterRange> {
        self.ranges.get(&parameter).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (WaveParameter, ParameterRange)> + '_ {
        self.ranges.iter().map(|(p, r)| (*p, *r))
    }

    /// Check every configured range is well-formed.
    pub fn validate(&self) -> Result<(), TypesError> {
        for (parameter, range) in self.iter() {
            ParameterRange::new(parameter, range.min, range.max)?;
        }
        Ok(())
    }
}

impl Default for ParameterRanges {
    fn default() -> Self {
        let ranges = [
            (WaveParameter::Amplitude, 0.0, 2.0),
            (WaveParameter::Frequency, 0.05, 2.0),
            (WaveParameter::Phase, 0.0, std::f64::consts::TAU),
            (WaveParameter::Speed, 0.1, 3.0),
            (WaveParameter::Damping, 0.0, 1.0),
            (WaveParameter::Complexity, 0.0, 1.0),
        ];
        Self {
            ranges: ranges
                .into_iter()
                .map(|(p, min, max)| (p, ParameterRange { min, max }))
                .collect(),
        }
    }
}
