//! Loop closure: remove constant-rate drift from a round-trip trajectory.
//!
//! Only valid when the session ends where it started, hence opt-in via
//! `TrackerConfig::loop_closure`.

use nalgebra::Vector3;
use ndarray::Array2;

use crate::types::AXES;

/// `position[last] - position[first]`
pub fn closure_error(positions: &Array2<f64>) -> Vector3<f64> {
    let n = positions.nrows();
    if n == 0 {
        return Vector3::zeros();
    }
    let last = n - 1;
    Vector3::from_fn(|k, _| positions[[last, k]] - positions[[0, k]])
}

/// Subtract `t(i) * error`, `t(i) = i / (N-1)`, from every position.
///
/// Returns the drift that was removed.
pub fn apply_loop_closure(positions: &mut Array2<f64>) -> Vector3<f64> {
    let error = closure_error(positions);
    let n = positions.nrows();
    if n < 2 {
        return error;
    }
    let last = (n - 1) as f64;
    for i in 0..n {
        let t = i as f64 / last;
        for k in 0..AXES {
            positions[[i, k]] -= t * error[k];
        }
    }
    log::debug!(
        "[CLOSURE] removed drift ({:.4}, {:.4}, {:.4}) m",
        error[0],
        error[1],
        error[2]
    );
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_endpoints_coincide() {
        let n = 57;
        let mut positions = Array2::<f64>::zeros((n, 3));
        for i in 0..n {
            let t = i as f64 * 0.1;
            positions[[i, 0]] = 3.0 * t.sin() + 0.4 * t;
            positions[[i, 1]] = 1e4 * t;
            positions[[i, 2]] = -0.02 * t * t;
        }
        let drift = apply_loop_closure(&mut positions);
        assert!(drift.norm() > 1.0);
        for k in 0..3 {
            assert_abs_diff_eq!(positions[[n - 1, k]], positions[[0, k]], epsilon = 1e-9);
        }
        assert_abs_diff_eq!(closure_error(&positions).norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_first_sample_untouched() {
        let mut positions = ndarray::array![[1.0, 2.0, 3.0], [5.0, 2.0, 0.0], [9.0, 4.0, 3.0]];
        apply_loop_closure(&mut positions);
        assert_eq!(positions.row(0).to_vec(), vec![1.0, 2.0, 3.0]);
        // Midpoint loses half the drift (8, 2, 0)
        assert_abs_diff_eq!(positions[[1, 0]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(positions[[1, 1]], 1.0, epsilon = 1e-12);
    }
}
