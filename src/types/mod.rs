pub mod linalg;

pub use linalg::*;

use nalgebra::{Quaternion, UnitQuaternion};
use serde::{Deserialize, Serialize};

use crate::config::AngleUnit;
use crate::error::{Result, TrackerError};

/// Fewest samples for which a time delta exists.
pub const MIN_SESSION_SAMPLES: usize = 2;

/// Quaternions shorter than this cannot be normalized.
pub const MIN_QUATERNION_NORM: f64 = 1e-9;

/// Device orientation as reported by the sensor source.
///
/// Euler angles rotate body → global as `Rz(yaw) * Ry(pitch) * Rx(roll)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Orientation {
    Euler { pitch: f64, roll: f64, yaw: f64 },
    Quaternion { w: f64, x: f64, y: f64, z: f64 },
}

impl Orientation {
    pub fn level() -> Self {
        Orientation::Euler {
            pitch: 0.0,
            roll: 0.0,
            yaw: 0.0,
        }
    }

    fn is_finite(&self) -> bool {
        match *self {
            Orientation::Euler { pitch, roll, yaw } => {
                pitch.is_finite() && roll.is_finite() && yaw.is_finite()
            }
            Orientation::Quaternion { w, x, y, z } => {
                w.is_finite() && x.is_finite() && y.is_finite() && z.is_finite()
            }
        }
    }

    /// Convert to the internal quaternion representation.
    ///
    /// Returns `None` for a quaternion too short to normalize.
    pub fn to_unit_quaternion(&self, unit: AngleUnit) -> Option<UnitQuaternion<f64>> {
        match *self {
            Orientation::Euler { pitch, roll, yaw } => {
                let (roll, pitch, yaw) = match unit {
                    AngleUnit::Radians => (roll, pitch, yaw),
                    AngleUnit::Degrees => (roll.to_radians(), pitch.to_radians(), yaw.to_radians()),
                };
                Some(UnitQuaternion::from_euler_angles(roll, pitch, yaw))
            }
            Orientation::Quaternion { w, x, y, z } => {
                UnitQuaternion::try_new(Quaternion::new(w, x, y, z), MIN_QUATERNION_NORM)
            }
        }
    }
}

/// One raw sample from the device.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Milliseconds, any epoch
    pub timestamp: i64,

    /// Body-frame acceleration (units per `TrackerConfig::acceleration_unit`)
    pub acceleration: [f64; 3],

    pub orientation: Orientation,

    /// Scalar field strength, carried through for heatmap consumers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnetic_magnitude: Option<f64>,
}

impl Measurement {
    fn check(&self, index: usize) -> Result<()> {
        if self.acceleration.iter().any(|a| !a.is_finite()) {
            return Err(TrackerError::NonFiniteValue {
                index,
                field: "acceleration",
            });
        }
        if !self.orientation.is_finite() {
            return Err(TrackerError::NonFiniteValue {
                index,
                field: "orientation",
            });
        }
        if let Some(mag) = self.magnetic_magnitude {
            if !mag.is_finite() {
                return Err(TrackerError::NonFiniteValue {
                    index,
                    field: "magnetic_magnitude",
                });
            }
        }
        if let Orientation::Quaternion { w, x, y, z } = self.orientation {
            if (w * w + x * x + y * y + z * z).sqrt() < MIN_QUATERNION_NORM {
                return Err(TrackerError::DegenerateOrientation { index });
            }
        }
        Ok(())
    }
}

/// Ordered measurements sharing one session identifier.
///
/// Construction enforces: at least two samples, finite values, non-decreasing
/// timestamps and normalizable quaternions. Immutable afterwards.
#[derive(Clone, Debug)]
pub struct Session {
    id: String,
    measurements: Vec<Measurement>,
}

impl Session {
    pub fn new(id: impl Into<String>, measurements: Vec<Measurement>) -> Result<Self> {
        if measurements.is_empty() {
            return Err(TrackerError::EmptySession);
        }
        if measurements.len() < MIN_SESSION_SAMPLES {
            return Err(TrackerError::InsufficientSamples {
                found: measurements.len(),
                required: MIN_SESSION_SAMPLES,
            });
        }

        for (index, m) in measurements.iter().enumerate() {
            m.check(index)?;
        }

        for (index, pair) in measurements.windows(2).enumerate() {
            if pair[1].timestamp < pair[0].timestamp {
                return Err(TrackerError::NonMonotonicTimestamps {
                    index: index + 1,
                    previous: pair[0].timestamp,
                    current: pair[1].timestamp,
                });
            }
        }

        Ok(Self {
            id: id.into(),
            measurements,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn timestamps(&self) -> Vec<i64> {
        self.measurements.iter().map(|m| m.timestamp).collect()
    }
}

/// One estimated sample of the output trajectory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub timestamp: i64,
    pub position: [f64; 3],
    pub velocity: [f64; 3],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnetic_magnitude: Option<f64>,
}

impl TrajectoryPoint {
    pub fn speed(&self) -> f64 {
        let [vx, vy, vz] = self.velocity;
        (vx * vx + vy * vy + vz * vz).sqrt()
    }
}

/// Reconstructed trajectory, one point per input measurement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub session_id: String,
    pub points: Vec<TrajectoryPoint>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Synthetic sessions shared by the test modules.
#[cfg(test)]
pub mod fixtures {
    use super::*;

    pub fn sample(timestamp: i64, acceleration: [f64; 3], orientation: Orientation) -> Measurement {
        Measurement {
            timestamp,
            acceleration,
            orientation,
            magnetic_magnitude: Some(48.0),
        }
    }

    /// Device lying level and still: 1 g on body Z.
    pub fn at_rest(samples: usize, dt_ms: i64) -> Session {
        let measurements = (0..samples)
            .map(|i| sample(i as i64 * dt_ms, [0.0, 0.0, 1.0], Orientation::level()))
            .collect();
        Session::new("at-rest", measurements).expect("valid fixture")
    }

    /// Level device pushed back and forth along X with a smooth acceleration profile.
    pub fn back_and_forth(samples: usize, dt_ms: i64) -> Session {
        let period = samples as f64;
        let measurements = (0..samples)
            .map(|i| {
                let phase = 2.0 * std::f64::consts::PI * i as f64 / period;
                sample(
                    i as i64 * dt_ms,
                    [0.3 * phase.sin(), 0.0, 1.0],
                    Orientation::level(),
                )
            })
            .collect();
        Session::new("back-and-forth", measurements).expect("valid fixture")
    }
}
