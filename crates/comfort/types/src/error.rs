//! Error types for comfort value construction

use thiserror::Error;

use crate::settings::WaveParameter;

/// Errors raised while constructing comfort value types
#[derive(Debug, Error, PartialEq)]
pub enum TypesError {
    /// A parameter range whose bounds are inverted or not finite
    #[error("invalid range for {parameter}: [{min}, {max}]")]
    InvalidRange {
        parameter: WaveParameter,
        min: f64,
        max: f64,
    },

    /// A parameter name that is not part of the wave matrix
    #[error("unknown wave parameter: {0}")]
    UnknownParameter(String),

    /// A threshold set that is internally inconsistent
    #[error("invalid threshold for {metric}: {reason}")]
    InvalidThreshold { metric: String, reason: String },

    /// A parameter value that is NaN or infinite
    #[error("non-finite value for {parameter}: {value}")]
    NonFiniteValue { parameter: WaveParameter, value: f64 },
}
