//! Position/velocity estimation
//!
//! A directional Kalman pass and the forward/backward blend built on it.

pub mod bidirectional;
pub mod kalman_pass;

pub use bidirectional::{BidirectionalEstimate, BidirectionalEstimator};
pub use kalman_pass::{KalmanPass, KalmanState, PassDirection, PassOutput, PassStats};
