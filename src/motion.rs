//! Stationary / moving classification for zero-velocity updates.

use ndarray::Array2;

use crate::config::TrackerConfig;
use crate::rolling::trailing_std;

/// Per-sample stationary flags. Computed once, read by both filter passes.
#[derive(Clone, Debug, PartialEq)]
pub struct MotionStates {
    stationary: Vec<bool>,
}

impl MotionStates {
    pub fn from_flags(stationary: Vec<bool>) -> Self {
        Self { stationary }
    }

    /// No sample stationary.
    pub fn all_moving(len: usize) -> Self {
        Self {
            stationary: vec![false; len],
        }
    }

    pub fn is_stationary(&self, index: usize) -> bool {
        self.stationary[index]
    }

    pub fn stationary_count(&self) -> usize {
        self.stationary.iter().filter(|&&s| s).count()
    }

    pub fn len(&self) -> usize {
        self.stationary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stationary.is_empty()
    }
}

/// Rolling-std test on the gravity-free acceleration magnitude.
#[derive(Clone, Copy, Debug)]
pub struct MotionClassifier {
    window: usize,
    threshold: f64,
}

impl MotionClassifier {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            window: config.zupt_window,
            threshold: config.zupt_threshold,
        }
    }

    /// `global_accel` is N×3 motion acceleration (gravity already removed).
    pub fn classify(&self, global_accel: &Array2<f64>) -> MotionStates {
        let magnitude: Vec<f64> = global_accel
            .rows()
            .into_iter()
            .map(|row| row.iter().map(|a| a * a).sum::<f64>().sqrt())
            .collect();

        let stationary: Vec<bool> = trailing_std(&magnitude, self.window)
            .into_iter()
            .map(|s| s < self.threshold)
            .collect();

        let states = MotionStates { stationary };
        log::debug!(
            "[ZUPT] {} of {} samples stationary (window {}, threshold {})",
            states.stationary_count(),
            states.len(),
            self.window,
            self.threshold
        );
        states
    }
}
