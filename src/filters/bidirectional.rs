//! Forward/backward Kalman passes and their linear blend.
//!
//! Each pass is a fresh `KalmanPass`; nothing is shared between them except the
//! read-only inputs. The blend trusts the forward pass at the first sample and
//! the backward pass at the last.

use ndarray::{Array1, Array2};

use crate::config::{BackwardAnchor, TrackerConfig};
use crate::error::Result;
use crate::filters::kalman_pass::{KalmanPass, PassDirection, PassOutput, PassStats};
use crate::motion::MotionStates;
use crate::types::AXES;

/// Blended estimate plus what each pass reported.
#[derive(Clone, Debug)]
pub struct BidirectionalEstimate {
    pub positions: Array2<f64>,
    pub velocities: Array2<f64>,
    pub forward_stats: PassStats,
    pub backward_stats: PassStats,
}

/// Backward-pass weight per sample: `i / (N-1)`.
pub fn blend_weights(n: usize) -> Array1<f64> {
    if n < 2 {
        return Array1::zeros(n);
    }
    let last = (n - 1) as f64;
    Array1::from_iter((0..n).map(|i| i as f64 / last))
}

/// `(1 - w[i]) * forward[i] + w[i] * backward[i]`, row by row.
pub fn blend(forward: &Array2<f64>, backward: &Array2<f64>) -> Array2<f64> {
    let weights = blend_weights(forward.nrows());
    let mut out = Array2::<f64>::zeros(forward.raw_dim());
    for (i, &w) in weights.iter().enumerate() {
        for k in 0..forward.ncols() {
            out[[i, k]] = (1.0 - w) * forward[[i, k]] + w * backward[[i, k]];
        }
    }
    out
}

pub struct BidirectionalEstimator<'a> {
    config: &'a TrackerConfig,
}

impl<'a> BidirectionalEstimator<'a> {
    pub fn new(config: &'a TrackerConfig) -> Self {
        Self { config }
    }

    /// Run both passes over `accel` (N×3 global motion acceleration) and blend.
    pub fn estimate(
        &self,
        accel: &Array2<f64>,
        dt: &Array1<f64>,
        motion: &MotionStates,
    ) -> Result<BidirectionalEstimate> {
        let forward = KalmanPass::run(PassDirection::Forward, self.config, accel, dt, motion)?;
        let mut backward = KalmanPass::run(PassDirection::Backward, self.config, accel, dt, motion)?;

        if self.config.backward_anchor == BackwardAnchor::ForwardTerminal {
            anchor_to_forward_terminal(&forward, &mut backward);
        }

        Ok(BidirectionalEstimate {
            positions: blend(&forward.positions, &backward.positions),
            velocities: blend(&forward.velocities, &backward.velocities),
            forward_stats: forward.stats,
            backward_stats: backward.stats,
        })
    }
}

/// Shift backward positions so both passes agree at the last sample.
fn anchor_to_forward_terminal(forward: &PassOutput, backward: &mut PassOutput) {
    let last = forward.positions.nrows() - 1;
    for k in 0..AXES {
        let offset = forward.positions[[last, k]] - backward.positions[[last, k]];
        backward.positions.column_mut(k).mapv_inplace(|p| p + offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_blend_boundaries() {
        let forward = array![[1.0, 2.0, 3.0], [5.0, 5.0, 5.0], [7.0, 8.0, 9.0]];
        let backward = array![[-1.0, -2.0, -3.0], [1.0, 1.0, 1.0], [0.0, 0.5, 1.0]];
        let out = blend(&forward, &backward);
        assert_eq!(out.row(0), forward.row(0));
        assert_eq!(out.row(2), backward.row(2));
        assert_abs_diff_eq!(out[[1, 0]], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_weights_two_samples() {
        let w = blend_weights(2);
        assert_eq!(w.to_vec(), vec![0.0, 1.0]);
    }

    fn moving_then_still(n: usize) -> (Array2<f64>, Array1<f64>, MotionStates) {
        let mut accel = Array2::<f64>::zeros((n, 3));
        for i in 0..n / 2 {
            accel[[i, 0]] = if i < n / 4 { 0.4 } else { -0.4 };
        }
        let mut dt = Array1::<f64>::from_elem(n, 0.1);
        dt[0] = 0.0;
        (accel, dt, MotionStates::all_moving(n))
    }

    #[test]
    fn test_estimate_matches_passes_at_ends() {
        let config = TrackerConfig::default();
        let (accel, dt, motion) = moving_then_still(40);
        let est = BidirectionalEstimator::new(&config)
            .estimate(&accel, &dt, &motion)
            .unwrap();
        let fwd = KalmanPass::run(PassDirection::Forward, &config, &accel, &dt, &motion).unwrap();
        let bwd = KalmanPass::run(PassDirection::Backward, &config, &accel, &dt, &motion).unwrap();
        assert_eq!(est.positions.row(0), fwd.positions.row(0));
        assert_eq!(est.positions.row(39), bwd.positions.row(39));
        assert_eq!(est.velocities.row(0), fwd.velocities.row(0));
        assert_eq!(est.positions.nrows(), 40);
    }

    #[test]
    fn test_forward_terminal_anchor() {
        let config = TrackerConfig {
            backward_anchor: BackwardAnchor::ForwardTerminal,
            ..TrackerConfig::default()
        };
        let (accel, dt, motion) = moving_then_still(40);
        let est = BidirectionalEstimator::new(&config)
            .estimate(&accel, &dt, &motion)
            .unwrap();
        let fwd = KalmanPass::run(PassDirection::Forward, &config, &accel, &dt, &motion).unwrap();
        for k in 0..3 {
            assert_abs_diff_eq!(est.positions[[39, k]], fwd.positions[[39, k]], epsilon = 1e-9);
        }
    }
}
