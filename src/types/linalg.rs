//! Linear algebra type system for the path tracker
//!
//! Provides compile-time dimension checking and clean type aliases
//! for the position/velocity Kalman filter.

use nalgebra::{SMatrix, SVector};

// ===== State Dimensions =====
pub const STATE_DIM: usize = 6; // [px, py, pz, vx, vy, vz]
pub const AXES: usize = 3;

// ===== Measurement Dimensions =====
pub const MEASURE_DIM_ACCEL: usize = 3; // (ax, ay, az)

// ===== 6-State Filter Types =====
pub type StateVec6 = SVector<f64, STATE_DIM>;
pub type StateMat6 = SMatrix<f64, STATE_DIM, STATE_DIM>;

// Control input (acceleration held over the step)
pub type ControlMat = SMatrix<f64, STATE_DIM, AXES>; // 6×3

// Measurement types
pub type AccelVec = SVector<f64, MEASURE_DIM_ACCEL>;
pub type AccelNoise = SMatrix<f64, MEASURE_DIM_ACCEL, MEASURE_DIM_ACCEL>;

// Kalman gain types
pub type KalmanGainAccel = SMatrix<f64, STATE_DIM, MEASURE_DIM_ACCEL>; // 6×3

// Jacobian types
pub type JacobianAccel = SMatrix<f64, MEASURE_DIM_ACCEL, STATE_DIM>; // 3×6
