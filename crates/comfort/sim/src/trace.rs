//! Recorded comfort traces.

use std::path::Path;

use anyhow::{bail, Context};
use chrono::{DateTime, Duration, Utc};
use comfort_types::{ComfortDataPoint, ComfortReadings, MeasurementMethod, WaveMatrixSettings};
use serde::{Deserialize, Serialize};

/// A recorded session: starting settings plus timed measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    /// Settings the session starts from; defaults when absent.
    #[serde(default)]
    pub initial_settings: Option<WaveMatrixSettings>,

    /// Wall-clock start of the recording; the replay clock starts here.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    pub points: Vec<TracePoint>,
}

/// One measurement, timed relative to the start of the trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracePoint {
    pub at_secs: f64,

    #[serde(default = "default_method")]
    pub method: MeasurementMethod,

    pub readings: ComfortReadings,

    #[serde(default = "default_quality")]
    pub quality: f64,
}

fn default_method() -> MeasurementMethod {
    MeasurementMethod::Combined
}

fn default_quality() -> f64 {
    1.0
}

impl Trace {
    /// Load a JSON trace.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading trace {}", path.display()))?;
        let trace: Trace = serde_json::from_str(&raw)
            .with_context(|| format!("parsing trace {}", path.display()))?;
        trace.check()?;
        Ok(trace)
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.points.is_empty() {
            bail!("trace has no points");
        }
        for (i, point) in self.points.iter().enumerate() {
            if !point.at_secs.is_finite() || point.at_secs < 0.0 {
                bail!("point {} has invalid offset {}", i, point.at_secs);
            }
        }
        Ok(())
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.started_at.unwrap_or_else(Utc::now)
    }

    /// Materialize the data points against `start`.
    pub fn data_points(&self, start: DateTime<Utc>) -> Vec<ComfortDataPoint> {
        self.points
            .iter()
            .map(|p| {
                let offset = Duration::milliseconds((p.at_secs * 1000.0).round() as i64);
                ComfortDataPoint::new(start + offset, p.method, p.readings.clone())
                    .with_quality(p.quality)
            })
            .collect()
    }

    /// Trace of overall-comfort readings spaced `every_secs` apart.
    #[cfg(test)]
    pub fn from_scores(scores: &[f64], every_secs: f64) -> Self {
        Self {
            initial_settings: None,
            started_at: None,
            points: scores
                .iter()
                .enumerate()
                .map(|(i, score)| TracePoint {
                    at_secs: i as f64 * every_secs,
                    method: default_method(),
                    readings: ComfortReadings::overall(*score),
                    quality: default_quality(),
                })
                .collect(),
        }
    }
}
