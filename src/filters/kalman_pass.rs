//! One directional pass of the 6-state position/velocity Kalman filter.
//!
//! State: `[px, py, pz, vx, vy, vz]`. The previous sample's global acceleration
//! drives the prediction as a control input; the current sample's acceleration
//! is then observed through the velocity increment `(v⁻ - v_prev) / dt`.
//! A backward pass runs in reversed time, so its velocities are negated when
//! written to the output.

use nalgebra::Vector3;
use ndarray::{Array1, Array2};
use serde::Serialize;

use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::motion::MotionStates;
use crate::types::{
    AccelNoise, AccelVec, ControlMat, JacobianAccel, KalmanGainAccel, StateMat6, StateVec6, AXES,
};

/// Regularization used when the configured epsilon is not enough to invert S.
const FALLBACK_EPSILON: f64 = 1e-6;

/// Variance floors after a speed clamp keep P positive definite.
const CLAMP_VARIANCE_FLOOR: f64 = 1e-2;
const CLAMP_DIAGONAL_BUMP: f64 = 1e-4;

/// Velocity variance left behind by a zero-velocity update.
const ZUPT_VELOCITY_VARIANCE: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassDirection {
    Forward,
    Backward,
}

impl PassDirection {
    fn label(self) -> &'static str {
        match self {
            PassDirection::Forward => "forward pass",
            PassDirection::Backward => "backward pass",
        }
    }

    /// Sample indices in traversal order.
    fn order(self, n: usize) -> Box<dyn Iterator<Item = usize>> {
        match self {
            PassDirection::Forward => Box::new(0..n),
            PassDirection::Backward => Box::new((0..n).rev()),
        }
    }
}

/// Snapshot of one pass's estimate.
#[derive(Clone, Debug, PartialEq)]
pub struct KalmanState {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub covariance: StateMat6,
}

/// Counters for everything a pass did beyond the plain predict/update.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PassStats {
    pub speed_clamps: usize,
    pub vertical_clamps: usize,
    pub zupts: usize,
    /// Updates that needed the fallback regularization or were skipped
    pub degraded_updates: usize,
    /// Steps whose result was non-finite and were rolled back
    pub held_steps: usize,
    /// Steps with `dt = 0` (duplicate timestamps)
    pub zero_dt_steps: usize,
}

/// Per-sample estimates of one pass, in sample order and forward-time convention.
#[derive(Clone, Debug)]
pub struct PassOutput {
    pub direction: PassDirection,
    pub positions: Array2<f64>,
    pub velocities: Array2<f64>,
    pub stats: PassStats,
}

/// Outcome of a measurement update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    Regularized,
    Skipped,
}

pub struct KalmanPass {
    direction: PassDirection,
    state: StateVec6,
    covariance: StateMat6,

    process_noise: f64,
    measurement_noise: AccelNoise,
    epsilon: f64,
    max_velocity: f64,
    max_vertical_velocity: f64,

    stats: PassStats,
}

impl KalmanPass {
    /// Zero state with the configured initial covariance.
    pub fn new(direction: PassDirection, config: &TrackerConfig) -> Self {
        Self {
            direction,
            state: StateVec6::zeros(),
            covariance: StateMat6::identity() * config.initial_covariance,
            process_noise: config.process_noise,
            measurement_noise: AccelNoise::identity() * config.measurement_noise,
            epsilon: config.regularization_epsilon,
            max_velocity: config.max_velocity,
            max_vertical_velocity: config.max_vertical_velocity,
            stats: PassStats::default(),
        }
    }

    pub fn position(&self) -> Vector3<f64> {
        self.state.fixed_rows::<3>(0).into_owned()
    }

    pub fn velocity(&self) -> Vector3<f64> {
        self.state.fixed_rows::<3>(3).into_owned()
    }

    pub fn state(&self) -> KalmanState {
        KalmanState {
            position: self.position(),
            velocity: self.velocity(),
            covariance: self.covariance,
        }
    }

    pub fn stats(&self) -> &PassStats {
        &self.stats
    }

    fn transition(dt: f64) -> StateMat6 {
        let mut f = StateMat6::identity();
        for k in 0..AXES {
            f[(k, k + 3)] = dt;
        }
        f
    }

    fn control(dt: f64) -> ControlMat {
        let mut b = ControlMat::zeros();
        for k in 0..AXES {
            b[(k, k)] = 0.5 * dt * dt;
            b[(k + 3, k)] = dt;
        }
        b
    }

    /// Discrete white-noise acceleration model, per axis.
    fn build_process_noise(dt: f64, accel_var: f64) -> StateMat6 {
        let q_pos = 0.25 * dt.powi(4) * accel_var;
        let q_cross = 0.5 * dt.powi(3) * accel_var;
        let q_vel = dt.powi(2) * accel_var;
        let mut q = StateMat6::zeros();
        for k in 0..AXES {
            q[(k, k)] = q_pos;
            q[(k, k + 3)] = q_cross;
            q[(k + 3, k)] = q_cross;
            q[(k + 3, k + 3)] = q_vel;
        }
        q
    }

    fn symmetrize(&mut self) {
        self.covariance = (self.covariance + self.covariance.transpose()) * 0.5;
    }

    /// `x⁻ = F·x + B·a_prev`, `P⁻ = F·P·Fᵀ + Q(dt)`
    pub fn predict(&mut self, dt: f64, accel_prev: &AccelVec) {
        let f = Self::transition(dt);
        self.state = f * self.state + Self::control(dt) * accel_prev;
        self.covariance =
            f * self.covariance * f.transpose() + Self::build_process_noise(dt, self.process_noise);
    }

    /// Observe `accel` through the velocity increment since `velocity_prev`.
    pub fn update(&mut self, dt: f64, accel: &AccelVec, velocity_prev: &Vector3<f64>) -> UpdateOutcome {
        let mut h = JacobianAccel::zeros();
        for k in 0..AXES {
            h[(k, k + 3)] = 1.0 / dt;
        }
        let predicted = (self.velocity() - velocity_prev) / dt;
        let innovation = accel - predicted;

        let s = h * self.covariance * h.transpose() + self.measurement_noise;
        let mut outcome = UpdateOutcome::Applied;
        let s_inv = match (s + AccelNoise::identity() * self.epsilon).try_inverse() {
            Some(inv) => inv,
            None => match (s + AccelNoise::identity() * self.epsilon.max(FALLBACK_EPSILON))
                .try_inverse()
            {
                Some(inv) => {
                    outcome = UpdateOutcome::Regularized;
                    inv
                }
                None => return UpdateOutcome::Skipped,
            },
        };

        let k: KalmanGainAccel = self.covariance * h.transpose() * s_inv;
        self.state += k * innovation;

        // Joseph form
        let i_kh = StateMat6::identity() - k * h;
        self.covariance = i_kh * self.covariance * i_kh.transpose()
            + k * self.measurement_noise * k.transpose();
        self.symmetrize();
        outcome
    }

    /// Speed limit by uniform rescale, then a hard limit on the vertical component.
    pub fn apply_constraints(&mut self) {
        let speed = self.velocity().norm();
        if speed > self.max_velocity && speed > 1e-6 {
            let scale = self.max_velocity / speed;
            for k in 3..6 {
                self.state[k] *= scale;
            }
            for i in 0..6 {
                self.covariance[(i, i)] = self.covariance[(i, i)].max(CLAMP_VARIANCE_FLOOR);
                self.covariance[(i, i)] += CLAMP_DIAGONAL_BUMP;
            }
            self.symmetrize();
            self.stats.speed_clamps += 1;
            log::trace!(
                "[KALMAN] {} speed {:.3} clamped to {:.3}",
                self.direction.label(),
                speed,
                self.max_velocity
            );
        }

        let vz = self.state[5];
        if vz.abs() > self.max_vertical_velocity {
            self.state[5] = vz.signum() * self.max_vertical_velocity;
            self.covariance[(5, 5)] = self.covariance[(5, 5)].max(CLAMP_VARIANCE_FLOOR);
            self.stats.vertical_clamps += 1;
        }
    }

    /// Zero-velocity update: clamp velocity and scrub its covariance.
    pub fn force_zero_velocity(&mut self) {
        for k in 3..6 {
            self.state[k] = 0.0;
        }
        for r in 3..6 {
            for c in 0..6 {
                self.covariance[(r, c)] = 0.0;
                self.covariance[(c, r)] = 0.0;
            }
            self.covariance[(r, r)] = ZUPT_VELOCITY_VARIANCE;
        }
        self.symmetrize();
        self.stats.zupts += 1;
    }

    /// Advance to the next sample in traversal order.
    pub fn step(&mut self, dt: f64, accel_prev: &AccelVec, accel: &AccelVec, stationary: bool) {
        let saved_state = self.state;
        let saved_covariance = self.covariance;

        if dt > 0.0 {
            let velocity_prev = self.velocity();
            self.predict(dt, accel_prev);
            match self.update(dt, accel, &velocity_prev) {
                UpdateOutcome::Applied => {}
                UpdateOutcome::Regularized => {
                    self.stats.degraded_updates += 1;
                    log::warn!(
                        "[KALMAN] {}: innovation covariance near-singular, regularized",
                        self.direction.label()
                    );
                }
                UpdateOutcome::Skipped => {
                    self.stats.degraded_updates += 1;
                    log::warn!(
                        "[KALMAN] {}: innovation covariance singular, update skipped",
                        self.direction.label()
                    );
                }
            }
        } else {
            self.stats.zero_dt_steps += 1;
        }

        if !self.is_finite() {
            self.state = saved_state;
            self.covariance = saved_covariance;
            self.stats.held_steps += 1;
            log::warn!(
                "[KALMAN] {}: non-finite estimate, holding previous state",
                self.direction.label()
            );
        }

        self.apply_constraints();
        if stationary {
            self.force_zero_velocity();
        }
    }

    fn is_finite(&self) -> bool {
        self.state.iter().all(|v| v.is_finite()) && self.covariance.iter().all(|v| v.is_finite())
    }

    /// Run a fresh pass over the whole session.
    ///
    /// `accel` is N×3 global motion acceleration and `dt[i]` the interval
    /// between samples `i-1` and `i`.
    pub fn run(
        direction: PassDirection,
        config: &TrackerConfig,
        accel: &Array2<f64>,
        dt: &Array1<f64>,
        motion: &MotionStates,
    ) -> Result<PassOutput> {
        let n = accel.nrows();
        let mut pass = KalmanPass::new(direction, config);
        let mut positions = Array2::<f64>::zeros((n, AXES));
        let mut velocities = Array2::<f64>::zeros((n, AXES));
        let sign = match direction {
            PassDirection::Forward => 1.0,
            PassDirection::Backward => -1.0,
        };
        let row = |i: usize| AccelVec::new(accel[[i, 0]], accel[[i, 1]], accel[[i, 2]]);

        let mut previous: Option<usize> = None;
        for i in direction.order(n) {
            match previous {
                None => {
                    pass.apply_constraints();
                    if motion.is_stationary(i) {
                        pass.force_zero_velocity();
                    }
                }
                Some(j) => {
                    // Interval to the previous sample in traversal order
                    let step_dt = match direction {
                        PassDirection::Forward => dt[i],
                        PassDirection::Backward => dt[j],
                    };
                    pass.step(step_dt, &row(j), &row(i), motion.is_stationary(i));
                }
            }

            let p = pass.position();
            let v = pass.velocity();
            if !(p.iter().all(|x| x.is_finite()) && v.iter().all(|x| x.is_finite())) {
                return Err(TrackerError::NumericalDivergence {
                    stage: direction.label(),
                    index: i,
                });
            }
            for k in 0..AXES {
                positions[[i, k]] = p[k];
                velocities[[i, k]] = sign * v[k];
            }
            previous = Some(i);
        }

        log::debug!(
            "[KALMAN] {} done: {:?}",
            direction.label(),
            pass.stats
        );

        Ok(PassOutput {
            direction,
            positions,
            velocities,
            stats: pass.stats,
        })
    }
}
