//! Batch dead reckoning for IMU sessions.
//!
//! A `Session` of accelerometer + orientation samples goes through median
//! conditioning, body → global rotation with gravity removal, ZUPT
//! classification, a forward/backward Kalman estimate, outlier replacement and
//! optional loop closure, and comes out as a `Trajectory` with one point per
//! input sample.

pub mod batch;
pub mod conditioning;
pub mod config;
pub mod correction;
pub mod error;
pub mod filters;
pub mod frame;
pub mod loader;
pub mod motion;
pub mod pipeline;
pub mod rolling;
pub mod storage;
pub mod trajectory;
pub mod types;

pub use config::TrackerConfig;
pub use error::{Result, TrackerError};
pub use pipeline::{PathTracker, ProcessingReport, TrackingResult};
pub use types::{Measurement, Orientation, Session, Trajectory, TrajectoryPoint};
