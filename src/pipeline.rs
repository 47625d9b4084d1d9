// pipeline.rs - One session in, one trajectory out
//
// condition → frame → classify → forward/backward estimate → outliers →
// loop closure (optional) → assemble. The tracker holds only its configuration,
// so one instance can serve any number of sessions, from any number of threads.

use chrono::Utc;
use serde::Serialize;

use crate::conditioning::condition;
use crate::config::TrackerConfig;
use crate::correction::{apply_loop_closure, closure_error, OutlierCorrector};
use crate::error::{Result, TrackerError};
use crate::filters::{BidirectionalEstimator, PassStats};
use crate::frame::FrameTransformer;
use crate::motion::MotionClassifier;
use crate::trajectory::{assemble, TrajectoryStats};
use crate::types::{Session, Trajectory, AXES};

/// What happened while processing one session.
#[derive(Clone, Debug, Serialize)]
pub struct ProcessingReport {
    pub session_id: String,
    pub processed_at: String,
    pub samples: usize,
    pub stationary_samples: usize,
    pub held_orientations: usize,
    pub forward_pass: PassStats,
    pub backward_pass: PassStats,
    pub outliers_replaced: [usize; AXES],
    /// End-minus-start position before loop closure
    pub drift_before_closure: [f64; AXES],
    pub loop_closure_applied: bool,
    pub stats: TrajectoryStats,
}

#[derive(Clone, Debug)]
pub struct TrackingResult {
    pub trajectory: Trajectory,
    pub report: ProcessingReport,
}

#[derive(Clone, Debug)]
pub struct PathTracker {
    config: TrackerConfig,
}

impl PathTracker {
    pub fn new(config: TrackerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Reconstruct the trajectory of one session.
    ///
    /// Either every sample gets a finite point or the whole run fails.
    pub fn process(&self, session: &Session) -> Result<TrackingResult> {
        let config = &self.config;
        config.validate_for(session.len())?;

        let conditioned = condition(session, config)?;
        let global = FrameTransformer::new(config).transform(&conditioned);
        let motion = MotionClassifier::new(config).classify(&global);

        let estimate =
            BidirectionalEstimator::new(config).estimate(&global, &conditioned.dt, &motion)?;

        let (mut positions, outliers_replaced) =
            OutlierCorrector::new(config).correct(&estimate.positions);

        let drift = closure_error(&positions);
        if config.loop_closure {
            apply_loop_closure(&mut positions);
        }

        if let Some(index) = positions
            .rows()
            .into_iter()
            .position(|row| row.iter().any(|v| !v.is_finite()))
        {
            return Err(TrackerError::NumericalDivergence {
                stage: "position correction",
                index,
            });
        }

        let trajectory = assemble(
            session.id(),
            &conditioned,
            &positions,
            &estimate.velocities,
            &motion,
        );
        let stats = TrajectoryStats::from_trajectory(&trajectory);

        let report = ProcessingReport {
            session_id: session.id().to_string(),
            processed_at: Utc::now().to_rfc3339(),
            samples: session.len(),
            stationary_samples: motion.stationary_count(),
            held_orientations: conditioned.held_orientations,
            forward_pass: estimate.forward_stats,
            backward_pass: estimate.backward_stats,
            outliers_replaced,
            drift_before_closure: [drift[0], drift[1], drift[2]],
            loop_closure_applied: config.loop_closure,
            stats,
        };

        log::info!(
            "[PIPELINE] session {}: {} samples ({} stationary), distance {:.2} m, max speed {:.2} m/s, max height {:.2} m, gap {:.3} m",
            report.session_id,
            report.samples,
            report.stationary_samples,
            report.stats.total_distance,
            report.stats.max_speed,
            report.stats.max_height,
            report.stats.closure_gap
        );

        Ok(TrackingResult { trajectory, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackwardAnchor;
    use crate::types::fixtures::{at_rest, back_and_forth, sample};
    use crate::types::Orientation;
    use approx::assert_abs_diff_eq;

    fn tracker(config: TrackerConfig) -> PathTracker {
        PathTracker::new(config).unwrap()
    }

    #[test]
    fn test_output_matches_input_cardinality() {
        let session = back_and_forth(60, 50);
        let result = tracker(TrackerConfig::default()).process(&session).unwrap();
        assert_eq!(result.trajectory.len(), session.len());
        let timestamps: Vec<i64> = result.trajectory.points.iter().map(|p| p.timestamp).collect();
        assert_eq!(timestamps, session.timestamps());
        assert_eq!(result.report.samples, 60);
    }

    #[test]
    fn test_two_sample_session() {
        let config = TrackerConfig {
            median_filter_window: 1,
            zupt_window: 1,
            outlier_window: 1,
            ..TrackerConfig::default()
        };
        let measurements = vec![
            sample(0, [0.1, 0.0, 1.0], Orientation::level()),
            sample(100, [0.2, 0.0, 1.0], Orientation::level()),
        ];
        let session = Session::new("pair", measurements).unwrap();
        let result = tracker(config).process(&session).unwrap();
        assert_eq!(result.trajectory.len(), 2);
    }

    #[test]
    fn test_device_at_rest_stays_put() {
        let session = at_rest(50, 100);
        let result = tracker(TrackerConfig::default()).process(&session).unwrap();
        let origin = result.trajectory.points[0].position;
        for point in &result.trajectory.points {
            assert_eq!(point.velocity, [0.0, 0.0, 0.0]);
            for k in 0..3 {
                assert!((point.position[k] - origin[k]).abs() < 1e-6);
            }
        }
        assert_eq!(result.report.stationary_samples, 50);
    }

    #[test]
    fn test_single_sample_rejected_before_processing() {
        let err = Session::new("one", vec![sample(0, [0.0, 0.0, 1.0], Orientation::level())])
            .unwrap_err();
        assert!(err.to_string().to_lowercase().contains("insufficient samples"));
    }

    #[test]
    fn test_loop_closure_closes_path() {
        let config = TrackerConfig {
            loop_closure: true,
            backward_anchor: BackwardAnchor::ForwardTerminal,
            ..TrackerConfig::default()
        };
        let result = tracker(config).process(&back_and_forth(60, 50)).unwrap();
        let drift = result.report.drift_before_closure;
        assert!(drift.iter().map(|d| d * d).sum::<f64>().sqrt() > 0.1);
        let first = result.trajectory.points[0].position;
        let last = result.trajectory.points[59].position;
        for k in 0..3 {
            assert_abs_diff_eq!(first[k], last[k], epsilon = 1e-9);
        }
        assert!(result.report.loop_closure_applied);
    }

    #[test]
    fn test_window_larger_than_session_is_config_error() {
        let err = tracker(TrackerConfig::default())
            .process(&at_rest(4, 100))
            .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_invalid_config_rejected_up_front() {
        let config = TrackerConfig {
            max_velocity: -1.0,
            ..TrackerConfig::default()
        };
        assert!(matches!(
            PathTracker::new(config),
            Err(TrackerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_speed_bound_respected() {
        let result = tracker(TrackerConfig::default())
            .process(&back_and_forth(120, 50))
            .unwrap();
        for point in &result.trajectory.points {
            assert!(point.speed() <= 3.0 + 1e-9);
            assert!(point.velocity[2].abs() <= 1.5 + 1e-9);
        }
    }
}
