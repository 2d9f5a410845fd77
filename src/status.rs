//! Pipeline status and glucose classification.
//!
//! Classification is a pure derivation from the latest value and fixed
//! thresholds; it owns no mutable state. The pipeline status is overwritten
//! on every tick outcome and collapses the error taxonomy into the three
//! user-facing strings the display surface renders.

use anyhow::{anyhow, Result};
use std::fmt;

/// Discrete state of the sampling pipeline. Exactly one value is live at a
/// time; owned by the scheduler and overwritten on every tick outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineStatus {
    /// Pipeline constructed, no tick completed yet.
    Initializing,
    /// Latest tick produced a usable prediction.
    Active,
    /// Endpoint explicitly signalled insufficient data; carries its message.
    Collecting(String),
    /// Latest tick failed; carries the user-facing reason.
    Degraded(String),
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStatus::Initializing => write!(f, "Initializing..."),
            PipelineStatus::Active => write!(f, "System Active"),
            PipelineStatus::Collecting(message) => write!(f, "{}", message),
            PipelineStatus::Degraded(reason) => write!(f, "{}", reason),
        }
    }
}

/// Classification thresholds in mg/dL.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Thresholds {
    /// Values strictly below this are Low.
    pub low: f64,
    /// Values strictly above this are High.
    pub high: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low: 70.0,
            high: 140.0,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<()> {
        if !self.low.is_finite() || !self.high.is_finite() {
            return Err(anyhow!("thresholds must be finite"));
        }
        if self.low >= self.high {
            return Err(anyhow!(
                "low threshold ({}) must be below high threshold ({})",
                self.low,
                self.high
            ));
        }
        Ok(())
    }
}

/// Clinical-style range for a glucose reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GlucoseRange {
    /// No successful prediction yet.
    Waiting,
    Low,
    Normal,
    High,
}

impl fmt::Display for GlucoseRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GlucoseRange::Waiting => write!(f, "Waiting..."),
            GlucoseRange::Low => write!(f, "Low"),
            GlucoseRange::Normal => write!(f, "Normal"),
            GlucoseRange::High => write!(f, "High"),
        }
    }
}

/// Classify the latest reading. Boundary values fall into Normal.
pub fn classify(latest: Option<f64>, thresholds: &Thresholds) -> GlucoseRange {
    let Some(value) = latest else {
        return GlucoseRange::Waiting;
    };
    if value < thresholds.low {
        GlucoseRange::Low
    } else if value > thresholds.high {
        GlucoseRange::High
    } else {
        GlucoseRange::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_covers_ranges_and_boundaries() {
        let t = Thresholds::default();
        assert_eq!(classify(Some(50.0), &t), GlucoseRange::Low);
        assert_eq!(classify(Some(100.0), &t), GlucoseRange::Normal);
        assert_eq!(classify(Some(150.0), &t), GlucoseRange::High);
        // Boundaries are inclusive into Normal.
        assert_eq!(classify(Some(70.0), &t), GlucoseRange::Normal);
        assert_eq!(classify(Some(140.0), &t), GlucoseRange::Normal);
        assert_eq!(classify(None, &t), GlucoseRange::Waiting);
    }

    #[test]
    fn thresholds_validate_ordering() {
        assert!(Thresholds::default().validate().is_ok());
        assert!(Thresholds {
            low: 140.0,
            high: 70.0
        }
        .validate()
        .is_err());
        assert!(Thresholds {
            low: 70.0,
            high: 70.0
        }
        .validate()
        .is_err());
        assert!(Thresholds {
            low: f64::NAN,
            high: 140.0
        }
        .validate()
        .is_err());
    }

    #[test]
    fn status_display_strings() {
        assert_eq!(PipelineStatus::Active.to_string(), "System Active");
        assert_eq!(
            PipelineStatus::Collecting("Collecting data...".to_string()).to_string(),
            "Collecting data..."
        );
        assert_eq!(
            PipelineStatus::Degraded("Backend Offline".to_string()).to_string(),
            "Backend Offline"
        );
        assert_eq!(GlucoseRange::Waiting.to_string(), "Waiting...");
    }
}
