//! Position corrections applied after the blended estimate
//!
//! Robust per-axis outlier replacement and optional loop-closure drift removal.

pub mod loop_closure;
pub mod outlier;

pub use loop_closure::{apply_loop_closure, closure_error};
pub use outlier::{interpolate_flagged, OutlierCorrector};
