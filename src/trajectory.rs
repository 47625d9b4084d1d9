//! Trajectory assembly and summary statistics.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::conditioning::ConditionedSession;
use crate::motion::MotionStates;
use crate::types::{Trajectory, TrajectoryPoint, AXES};

/// Zip corrected positions and blended velocities with the original timestamps.
///
/// Velocities of stationary samples are zeroed again; the position corrections
/// never touch velocity.
pub fn assemble(
    session_id: &str,
    conditioned: &ConditionedSession,
    positions: &Array2<f64>,
    velocities: &Array2<f64>,
    motion: &MotionStates,
) -> Trajectory {
    let points = conditioned
        .timestamps
        .iter()
        .enumerate()
        .map(|(i, &timestamp)| {
            let mut position = [0.0; AXES];
            let mut velocity = [0.0; AXES];
            for k in 0..AXES {
                position[k] = positions[[i, k]];
                if !motion.is_stationary(i) {
                    velocity[k] = velocities[[i, k]];
                }
            }
            TrajectoryPoint {
                timestamp,
                position,
                velocity,
                magnetic_magnitude: conditioned.magnetic_magnitude[i],
            }
        })
        .collect();

    Trajectory {
        session_id: session_id.to_string(),
        points,
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryStats {
    /// Sum of segment lengths (m)
    pub total_distance: f64,
    pub max_speed: f64,
    pub mean_speed: f64,
    /// Highest Z reached (m)
    pub max_height: f64,
    /// Remaining distance between first and last point (m)
    pub closure_gap: f64,
    pub duration_secs: f64,
}

impl TrajectoryStats {
    pub fn from_trajectory(trajectory: &Trajectory) -> Self {
        let points = &trajectory.points;
        let (Some(first), Some(last)) = (points.first(), points.last()) else {
            return Self::default();
        };

        let total_distance = points
            .windows(2)
            .map(|w| distance(&w[0].position, &w[1].position))
            .sum();
        let speeds: Vec<f64> = points.iter().map(TrajectoryPoint::speed).collect();
        let max_speed = speeds.iter().copied().fold(0.0, f64::max);
        let mean_speed = speeds.iter().sum::<f64>() / speeds.len() as f64;
        let max_height = points
            .iter()
            .map(|p| p.position[2])
            .fold(f64::NEG_INFINITY, f64::max);

        Self {
            total_distance,
            max_speed,
            mean_speed,
            max_height,
            closure_gap: distance(&first.position, &last.position),
            duration_secs: last.timestamp.saturating_sub(first.timestamp) as f64 / 1000.0,
        }
    }
}

fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}
