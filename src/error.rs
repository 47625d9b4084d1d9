use thiserror::Error;

/// Path tracker error types
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Session contains no measurements")]
    EmptySession,

    #[error("Insufficient samples: found {found}, need at least {required}")]
    InsufficientSamples { found: usize, required: usize },

    #[error("Non-finite {field} at sample {index}")]
    NonFiniteValue { index: usize, field: &'static str },

    #[error("Non-monotonic timestamps at sample {index}: {current} ms follows {previous} ms")]
    NonMonotonicTimestamps {
        index: usize,
        previous: i64,
        current: i64,
    },

    #[error("Degenerate orientation at sample {index} (zero-norm quaternion)")]
    DegenerateOrientation { index: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration window {name}={window} exceeds session length {samples}")]
    WindowTooLarge {
        name: &'static str,
        window: usize,
        samples: usize,
    },

    #[error("Numerical divergence in {stage} at sample {index}")]
    NumericalDivergence { stage: &'static str, index: usize },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Worker failed: {0}")]
    Worker(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl TrackerError {
    /// True for defects in the measurements themselves (rejected before processing).
    pub fn is_input_defect(&self) -> bool {
        matches!(
            self,
            TrackerError::EmptySession
                | TrackerError::InsufficientSamples { .. }
                | TrackerError::NonFiniteValue { .. }
                | TrackerError::NonMonotonicTimestamps { .. }
                | TrackerError::DegenerateOrientation { .. }
        )
    }

    /// True for configuration problems caught at validation time.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            TrackerError::InvalidConfig(_) | TrackerError::WindowTooLarge { .. }
        )
    }
}

/// Result type for path tracker operations
pub type Result<T> = std::result::Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_samples_message() {
        let err = TrackerError::InsufficientSamples {
            found: 1,
            required: 2,
        };
        assert!(err.to_string().to_lowercase().contains("insufficient samples"));
        assert!(err.is_input_defect());
        assert!(!err.is_config_error());
    }

    #[test]
    fn test_config_classification() {
        let err = TrackerError::WindowTooLarge {
            name: "zupt_window",
            window: 9,
            samples: 4,
        };
        assert!(err.is_config_error());
        assert!(!err.is_input_defect());
    }
}
