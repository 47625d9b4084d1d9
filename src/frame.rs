//! Body → global frame rotation and gravity removal.

use nalgebra::{UnitQuaternion, Vector3};
use ndarray::Array2;

use crate::config::TrackerConfig;
use crate::conditioning::ConditionedSession;
use crate::types::AXES;

/// Rotates body-frame specific force into the global frame and removes gravity.
#[derive(Clone, Copy, Debug)]
pub struct FrameTransformer {
    gravity: f64,
    /// Raw unit → m/s²
    scale: f64,
}

impl FrameTransformer {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            gravity: config.gravity,
            scale: config.acceleration_scale(),
        }
    }

    /// Motion-induced acceleration in the global frame (m/s²).
    pub fn to_global(&self, orientation: &UnitQuaternion<f64>, raw: Vector3<f64>) -> Vector3<f64> {
        let world = orientation * (raw * self.scale);
        world - Vector3::new(0.0, 0.0, self.gravity)
    }

    /// N×3 global motion acceleration for a conditioned session.
    pub fn transform(&self, session: &ConditionedSession) -> Array2<f64> {
        let n = session.len();
        let mut global = Array2::<f64>::zeros((n, AXES));
        for i in 0..n {
            let raw = Vector3::new(
                session.acceleration[[i, 0]],
                session.acceleration[[i, 1]],
                session.acceleration[[i, 2]],
            );
            let a = self.to_global(&session.orientation[i], raw);
            for axis in 0..AXES {
                global[[i, axis]] = a[axis];
            }
        }
        global
    }
}
