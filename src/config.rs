// config.rs - Tunables for one path reconstruction run
//
// Every field has a default so a JSON file may override any subset of them.
// Validation runs once before the first stage; nothing deep in the pipeline
// re-checks these values.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, TrackerError};

// ─── Units and options ───────────────────────────────────────────────────────

/// Unit of the raw acceleration channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccelerationUnit {
    /// Multiples of g, scaled by `TrackerConfig::gravity`
    StandardGravity,
    MetersPerSecondSquared,
}

/// Unit of Euler orientation angles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngleUnit {
    Radians,
    Degrees,
}

/// Where the backward pass is anchored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackwardAnchor {
    /// Backward pass starts from the zero state at the last sample
    Origin,
    /// Backward positions are shifted so its last sample coincides with the
    /// forward pass's last sample (one-way sessions)
    ForwardTerminal,
}

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    // ── Units ──
    pub gravity: f64,
    pub acceleration_unit: AccelerationUnit,
    pub angle_unit: AngleUnit,

    // ── Physical velocity bounds ──
    pub max_velocity: f64,
    pub max_vertical_velocity: f64,

    // ── Signal conditioning ──
    pub median_filter_window: usize,

    // ── ZUPT ──
    pub zupt_window: usize,
    pub zupt_threshold: f64,

    // ── Kalman filter ──
    pub process_noise: f64,
    pub measurement_noise: f64,
    pub initial_covariance: f64,
    pub regularization_epsilon: f64,
    pub backward_anchor: BackwardAnchor,

    // ── Outlier rejection ──
    pub outlier_window: usize,
    pub outlier_threshold: f64,

    // ── Drift correction ──
    pub loop_closure: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            gravity: 9.81,
            acceleration_unit: AccelerationUnit::StandardGravity,
            angle_unit: AngleUnit::Radians,
            max_velocity: 3.0,
            max_vertical_velocity: 1.5,
            median_filter_window: 5,
            zupt_window: 5,
            zupt_threshold: 0.1,
            process_noise: 0.1,
            measurement_noise: 0.1,
            initial_covariance: 1000.0,
            regularization_epsilon: 1e-9,
            backward_anchor: BackwardAnchor::Origin,
            outlier_window: 5,
            outlier_threshold: 3.0,
            loop_closure: false,
        }
    }
}

impl TrackerConfig {
    /// Load overrides from a JSON file; absent fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: TrackerConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that do not depend on the session.
    pub fn validate(&self) -> Result<()> {
        positive("gravity", self.gravity)?;
        positive("max_velocity", self.max_velocity)?;
        positive("max_vertical_velocity", self.max_vertical_velocity)?;
        positive("process_noise", self.process_noise)?;
        positive("measurement_noise", self.measurement_noise)?;
        positive("initial_covariance", self.initial_covariance)?;
        non_negative("zupt_threshold", self.zupt_threshold)?;
        non_negative("outlier_threshold", self.outlier_threshold)?;
        non_negative("regularization_epsilon", self.regularization_epsilon)?;

        odd_window("median_filter_window", self.median_filter_window)?;
        odd_window("outlier_window", self.outlier_window)?;
        if self.zupt_window == 0 {
            return Err(TrackerError::InvalidConfig(
                "zupt_window must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Full validation against a session of `samples` measurements.
    pub fn validate_for(&self, samples: usize) -> Result<()> {
        self.validate()?;
        for (name, window) in self.windows() {
            if window > samples {
                return Err(TrackerError::WindowTooLarge {
                    name,
                    window,
                    samples,
                });
            }
        }
        Ok(())
    }

    fn windows(&self) -> [(&'static str, usize); 3] {
        [
            ("median_filter_window", self.median_filter_window),
            ("zupt_window", self.zupt_window),
            ("outlier_window", self.outlier_window),
        ]
    }

    /// Factor converting raw acceleration to m/s².
    pub fn acceleration_scale(&self) -> f64 {
        match self.acceleration_unit {
            AccelerationUnit::StandardGravity => self.gravity,
            AccelerationUnit::MetersPerSecondSquared => 1.0,
        }
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(TrackerError::InvalidConfig(format!(
            "{name} must be a positive finite number, got {value}"
        )));
    }
    Ok(())
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(TrackerError::InvalidConfig(format!(
            "{name} must be finite and non-negative, got {value}"
        )));
    }
    Ok(())
}

fn odd_window(name: &str, window: usize) -> Result<()> {
    if window == 0 || window % 2 == 0 {
        return Err(TrackerError::InvalidConfig(format!(
            "{name} must be odd and at least 1, got {window}"
        )));
    }
    Ok(())
}
