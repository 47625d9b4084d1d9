// conditioning.rs - Impulse-noise suppression and session time base
//
// Median-filters the acceleration channels and the orientation channel, then
// derives elapsed time and per-sample deltas from the millisecond timestamps.

use nalgebra::{Quaternion, UnitQuaternion};
use ndarray::{Array1, Array2};

use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::rolling::centered_median;
use crate::types::{Session, AXES, MIN_QUATERNION_NORM};

/// Session after median filtering, with its time base.
#[derive(Clone, Debug)]
pub struct ConditionedSession {
    pub timestamps: Vec<i64>,
    /// Seconds since the first sample
    pub time_sec: Array1<f64>,
    /// `dt[i] = time_sec[i] - time_sec[i-1]`, `dt[0] = 0`
    pub dt: Array1<f64>,
    /// N×3, still in the configured acceleration unit and body frame
    pub acceleration: Array2<f64>,
    pub orientation: Vec<UnitQuaternion<f64>>,
    pub magnetic_magnitude: Vec<Option<f64>>,
    /// Filtered orientations that collapsed and reused their predecessor
    pub held_orientations: usize,
}

impl ConditionedSession {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Elapsed seconds and deltas from millisecond timestamps.
pub fn time_base(timestamps: &[i64]) -> (Array1<f64>, Array1<f64>) {
    let n = timestamps.len();
    let t0 = timestamps.first().copied().unwrap_or(0);
    let time_sec = Array1::from_iter(
        timestamps
            .iter()
            .map(|&t| t.saturating_sub(t0) as f64 / 1000.0),
    );
    let mut dt = Array1::<f64>::zeros(n);
    for i in 1..n {
        dt[i] = time_sec[i] - time_sec[i - 1];
    }
    (time_sec, dt)
}

pub fn condition(session: &Session, config: &TrackerConfig) -> Result<ConditionedSession> {
    let n = session.len();
    let window = config.median_filter_window;
    if window > n {
        return Err(TrackerError::WindowTooLarge {
            name: "median_filter_window",
            window,
            samples: n,
        });
    }

    let measurements = session.measurements();

    let mut acceleration = Array2::<f64>::zeros((n, AXES));
    for axis in 0..AXES {
        let raw: Vec<f64> = measurements.iter().map(|m| m.acceleration[axis]).collect();
        for (i, v) in centered_median(&raw, window).into_iter().enumerate() {
            acceleration[[i, axis]] = v;
        }
    }

    let mut raw_orientation = Vec::with_capacity(n);
    for (index, m) in measurements.iter().enumerate() {
        let q = m
            .orientation
            .to_unit_quaternion(config.angle_unit)
            .ok_or(TrackerError::DegenerateOrientation { index })?;
        raw_orientation.push(q);
    }
    let (orientation, held_orientations) = filter_orientation(&raw_orientation, window);
    if held_orientations > 0 {
        log::warn!(
            "[PIPELINE] session {}: {} filtered orientations degenerate, held previous",
            session.id(),
            held_orientations
        );
    }

    let (time_sec, dt) = time_base(&session.timestamps());

    Ok(ConditionedSession {
        timestamps: session.timestamps(),
        time_sec,
        dt,
        acceleration,
        orientation,
        magnetic_magnitude: measurements.iter().map(|m| m.magnetic_magnitude).collect(),
        held_orientations,
    })
}

/// Component-wise median over hemisphere-aligned quaternions.
///
/// `q` and `-q` are the same rotation; each sample is flipped onto the side of
/// its predecessor before filtering. Returns the filtered sequence and how many
/// samples had to hold the previous orientation.
pub fn filter_orientation(
    raw: &[UnitQuaternion<f64>],
    window: usize,
) -> (Vec<UnitQuaternion<f64>>, usize) {
    let mut aligned: Vec<[f64; 4]> = Vec::with_capacity(raw.len());
    for q in raw {
        let mut c = [q.w, q.i, q.j, q.k];
        if let Some(prev) = aligned.last() {
            let dot: f64 = prev.iter().zip(c.iter()).map(|(a, b)| a * b).sum();
            if dot < 0.0 {
                c.iter_mut().for_each(|v| *v = -*v);
            }
        }
        aligned.push(c);
    }

    let channels: Vec<Vec<f64>> = (0..4)
        .map(|k| {
            let column: Vec<f64> = aligned.iter().map(|c| c[k]).collect();
            centered_median(&column, window)
        })
        .collect();

    let mut held = 0;
    let mut out: Vec<UnitQuaternion<f64>> = Vec::with_capacity(raw.len());
    for i in 0..raw.len() {
        let q = Quaternion::new(channels[0][i], channels[1][i], channels[2][i], channels[3][i]);
        match UnitQuaternion::try_new(q, MIN_QUATERNION_NORM) {
            Some(unit) => out.push(unit),
            None => {
                held += 1;
                let previous = out.last().copied().unwrap_or(raw[i]);
                out.push(previous);
            }
        }
    }
    (out, held)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::{at_rest, sample};
    use crate::types::{Measurement, Orientation};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_time_base() {
        let (t, dt) = time_base(&[1000, 1100, 1100, 1350]);
        assert_abs_diff_eq!(t[3], 0.35, epsilon = 1e-12);
        assert_eq!(dt[0], 0.0);
        assert_abs_diff_eq!(dt[1], 0.1, epsilon = 1e-12);
        assert_eq!(dt[2], 0.0);
        assert_abs_diff_eq!(dt[3], 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_time_base_extreme_timestamps() {
        let (t, dt) = time_base(&[i64::MIN, 0, i64::MAX]);
        assert!(t.iter().chain(dt.iter()).all(|v| v.is_finite()));
        assert!(dt.iter().all(|&d| d >= 0.0));
        assert_eq!(t[2], i64::MAX as f64 / 1000.0);
    }

    #[test]
    fn test_spike_suppressed() {
        let mut measurements: Vec<Measurement> = (0..9)
            .map(|i| sample(i * 10, [0.0, 0.0, 1.0], Orientation::level()))
            .collect();
        measurements[4].acceleration[0] = 40.0;
        let session = Session::new("spike", measurements).unwrap();
        let conditioned = condition(&session, &TrackerConfig::default()).unwrap();
        assert!(conditioned.acceleration.column(0).iter().all(|&a| a == 0.0));
        assert_eq!(conditioned.len(), 9);
    }

    #[test]
    fn test_window_larger_than_session() {
        let session = at_rest(3, 100);
        let err = condition(&session, &TrackerConfig::default()).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_sign_flipped_quaternions_filter_cleanly() {
        let q = UnitQuaternion::from_euler_angles(0.1, -0.2, 0.7);
        let flipped = UnitQuaternion::new_unchecked(-q.into_inner());
        let raw = vec![q, flipped, q, flipped, q];
        let (out, held) = filter_orientation(&raw, 3);
        assert_eq!(held, 0);
        for f in out {
            assert!(f.angle_to(&q) < 1e-9);
        }
    }

    #[test]
    fn test_collapsed_median_holds_previous() {
        // Half-turns about X, Y and Z: every component median of the full window is 0
        let qx = UnitQuaternion::new_unchecked(Quaternion::new(0.0, 1.0, 0.0, 0.0));
        let qy = UnitQuaternion::new_unchecked(Quaternion::new(0.0, 0.0, 1.0, 0.0));
        let qz = UnitQuaternion::new_unchecked(Quaternion::new(0.0, 0.0, 0.0, 1.0));
        let (out, held) = filter_orientation(&[qx, qy, qz], 3);
        assert_eq!(held, 1);
        assert_eq!(out[1], out[0]);
        assert!(out.iter().all(|q| (q.norm() - 1.0).abs() < 1e-12));
    }
}
