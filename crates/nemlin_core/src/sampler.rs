//! Adaptive integration resampled to a bounded output spacing.
//!
//! The stepper picks its own step sizes for accuracy. Whenever an accepted
//! step is longer than the requested maximum gap, the interval is backfilled
//! with cubic Hermite samples so consumers never see consecutive samples
//! further apart than `max_gap`.

use crate::interpolation::HermiteSegment;
use crate::solvers::{Rkf45, StepController, StepFailure, StepperSettings, Tolerances};
use crate::traits::VectorField;
use crate::trajectory::{CompletionStatus, Trajectory};
use serde::{Deserialize, Serialize};
use std::mem;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors for requests that cannot be integrated at all.
///
/// Failures during a run do not show up here; they truncate the trajectory
/// and are reported through [`CompletionStatus`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SamplerError {
    #[error("vector field has zero dimension")]
    EmptyState,
    #[error("initial state dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("initial state component {index} is not finite")]
    NonFiniteInitialState { index: usize },
    #[error("horizon must be positive and finite, got {0}")]
    InvalidHorizon(f64),
    #[error("max_gap must be positive and finite, got {0}")]
    InvalidMaxGap(f64),
    #[error("tolerances must be positive and finite, got atol = {atol}, rtol = {rtol}")]
    InvalidTolerance { atol: f64, rtol: f64 },
    #[error("horizon / max_gap asks for about {requested} samples, limit is {limit}")]
    TooManySamples { requested: f64, limit: usize },
    #[error("could not allocate storage for {samples} samples")]
    OutOfMemory { samples: usize },
}

/// One integration request: where to start, how far to go and how densely to
/// sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingRequest {
    pub initial_state: Vec<f64>,
    pub horizon: f64,
    #[serde(default = "SamplingRequest::default_max_gap")]
    pub max_gap: f64,
    #[serde(default)]
    pub tolerances: Tolerances,
}

impl SamplingRequest {
    pub const DEFAULT_MAX_GAP: f64 = 0.1;
    /// Upper bound on `horizon / max_gap`. Keeps a three-component
    /// trajectory around 128 MiB, which a wasm32 heap can still hold.
    pub const MAX_SAMPLES: usize = 1 << 22;

    pub fn new(initial_state: Vec<f64>, horizon: f64) -> Self {
        Self {
            initial_state,
            horizon,
            max_gap: Self::DEFAULT_MAX_GAP,
            tolerances: Tolerances::default(),
        }
    }

    fn default_max_gap() -> f64 {
        Self::DEFAULT_MAX_GAP
    }

    pub fn with_max_gap(mut self, max_gap: f64) -> Self {
        self.max_gap = max_gap;
        self
    }

    pub fn with_tolerances(mut self, tolerances: Tolerances) -> Self {
        self.tolerances = tolerances;
        self
    }

    pub fn validate(&self, dim: usize) -> Result<(), SamplerError> {
        if dim == 0 {
            return Err(SamplerError::EmptyState);
        }
        if self.initial_state.len() != dim {
            return Err(SamplerError::DimensionMismatch {
                expected: dim,
                got: self.initial_state.len(),
            });
        }
        if let Some(index) = self.initial_state.iter().position(|v| !v.is_finite()) {
            return Err(SamplerError::NonFiniteInitialState { index });
        }
        if !(self.horizon.is_finite() && self.horizon > 0.0) {
            return Err(SamplerError::InvalidHorizon(self.horizon));
        }
        if !(self.max_gap.is_finite() && self.max_gap > 0.0) {
            return Err(SamplerError::InvalidMaxGap(self.max_gap));
        }
        let Tolerances { atol, rtol } = self.tolerances;
        if !(atol.is_finite() && atol > 0.0 && rtol.is_finite() && rtol > 0.0) {
            return Err(SamplerError::InvalidTolerance { atol, rtol });
        }
        let requested = self.horizon / self.max_gap;
        if requested > Self::MAX_SAMPLES as f64 {
            return Err(SamplerError::TooManySamples {
                requested,
                limit: Self::MAX_SAMPLES,
            });
        }
        Ok(())
    }

    /// Storage to reserve up front: one sample per gap plus both ends.
    /// Runs that need more grow the buffer fallibly.
    fn expected_samples(&self) -> usize {
        let estimate = (self.horizon / self.max_gap).ceil() as usize;
        estimate.min(Self::MAX_SAMPLES).saturating_add(2)
    }
}

/// Drives the stepper over a horizon and collects a gap-bounded trajectory.
///
/// Buffers are reused across requests on the same sampler. A sampler is not
/// meant to be shared between threads while a run is in progress.
pub struct TrajectorySampler<F: VectorField> {
    field: F,
    settings: StepperSettings,
    stepper: Rkf45,
    trajectory: Trajectory,
    state: Vec<f64>,
    prev_state: Vec<f64>,
    dx_prev: Vec<f64>,
    dx_new: Vec<f64>,
    interp: Vec<f64>,
}

impl<F: VectorField> TrajectorySampler<F> {
    pub fn new(field: F) -> Self {
        Self::with_settings(field, StepperSettings::default())
    }

    pub fn with_settings(field: F, settings: StepperSettings) -> Self {
        let dim = field.dimension();
        Self {
            field,
            settings,
            stepper: Rkf45::new(dim),
            trajectory: Trajectory::new(dim),
            state: vec![0.0; dim],
            prev_state: vec![0.0; dim],
            dx_prev: vec![0.0; dim],
            dx_new: vec![0.0; dim],
            interp: vec![0.0; dim],
        }
    }

    pub fn field(&self) -> &F {
        &self.field
    }

    pub fn settings(&self) -> &StepperSettings {
        &self.settings
    }

    /// Result of the most recent request (empty before the first one).
    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    /// Moves the most recent result out, leaving an empty buffer behind.
    pub fn take_trajectory(&mut self) -> Trajectory {
        let dim = self.field.dimension();
        mem::replace(&mut self.trajectory, Trajectory::new(dim))
    }

    pub fn into_trajectory(self) -> Trajectory {
        self.trajectory
    }

    /// Integrates from t = 0 to `request.horizon` and returns the sampled
    /// trajectory.
    ///
    /// The previous result is overwritten. A stepper failure ends the run
    /// early; the samples produced so far are kept and the status is
    /// [`CompletionStatus::Truncated`]. If the sample buffer cannot grow the
    /// run fails with [`SamplerError::OutOfMemory`] and the buffer is left
    /// empty.
    pub fn compute_trajectory(
        &mut self,
        params: &F::Params,
        request: &SamplingRequest,
    ) -> Result<&Trajectory, SamplerError> {
        let dim = self.field.dimension();
        request.validate(dim)?;

        let horizon = request.horizon;
        let max_gap = request.max_gap;
        let controller = StepController::new(request.tolerances, self.settings, Rkf45::ORDER);

        let reserved = request.expected_samples();
        if self.trajectory.reset(dim, reserved).is_err() {
            warn!(samples = reserved, "could not reserve trajectory storage");
            return Err(SamplerError::OutOfMemory { samples: reserved });
        }
        self.stepper.reset_stats();
        self.state.copy_from_slice(&request.initial_state);

        let mut t = 0.0;
        let mut h = request.tolerances.initial_step().max(self.settings.min_step);
        let mut endpoint_evaluations = 1u64;

        debug!(dim, horizon, max_gap, h0 = h, "starting trajectory");

        if self.trajectory.push(t, &self.state).is_err() {
            self.trajectory.clear(dim);
            return Err(SamplerError::OutOfMemory { samples: 1 });
        }
        self.field.apply(t, &self.state, params, &mut self.dx_prev);

        let outcome = 'run: loop {
            if t >= horizon {
                break Ok(CompletionStatus::Complete);
            }

            let t_prev = t;
            self.prev_state.copy_from_slice(&self.state);

            if let Err(reason) = self.stepper.advance(
                &self.field,
                params,
                &controller,
                &mut t,
                &mut self.state,
                &mut h,
                horizon,
            ) {
                break Ok(CompletionStatus::Truncated { at: t_prev, reason });
            }

            self.field.apply(t, &self.state, params, &mut self.dx_new);
            endpoint_evaluations += 1;
            if self.dx_new.iter().any(|v| !v.is_finite()) {
                break Ok(CompletionStatus::Truncated {
                    at: t_prev,
                    reason: StepFailure::NonFinite { t },
                });
            }

            let segment = HermiteSegment {
                t0: t_prev,
                t1: t,
                x0: &self.prev_state,
                x1: &self.state,
                dx0: &self.dx_prev,
                dx1: &self.dx_new,
            };

            if segment.duration() > max_gap {
                let n = segment.subdivisions(max_gap);
                // i = 0 is the previous sample, already emitted
                for i in 1..n {
                    let p = i as f64 / n as f64;
                    segment.eval(p, &mut self.interp);
                    if let Err(err) = self.trajectory.push(segment.time_at(p), &self.interp) {
                        break 'run Err(err);
                    }
                }
            }

            if let Err(err) = self.trajectory.push(t, &self.state) {
                break 'run Err(err);
            }
            mem::swap(&mut self.dx_prev, &mut self.dx_new);
        };

        let status = match outcome {
            Ok(status) => status,
            Err(err) => {
                let samples = self.trajectory.len();
                warn!(samples, %err, "trajectory storage exhausted");
                self.trajectory.clear(dim);
                return Err(SamplerError::OutOfMemory { samples });
            }
        };

        let mut stats = self.stepper.stats();
        stats.evaluations += endpoint_evaluations;

        match status {
            CompletionStatus::Complete => debug!(
                samples = self.trajectory.len(),
                accepted = stats.accepted_steps,
                rejected = stats.rejected_steps,
                "trajectory complete"
            ),
            CompletionStatus::Truncated { at, reason } => warn!(
                samples = self.trajectory.len(),
                at,
                %reason,
                "trajectory truncated"
            ),
        }

        self.trajectory.finish(status, stats);
        Ok(&self.trajectory)
    }
}

/// One-shot convenience wrapper around [`TrajectorySampler`].
pub fn compute_trajectory<F: VectorField>(
    field: F,
    params: &F::Params,
    request: &SamplingRequest,
) -> Result<Trajectory, SamplerError> {
    let mut sampler = TrajectorySampler::new(field);
    sampler.compute_trajectory(params, request)?;
    Ok(sampler.into_trajectory())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HindmarshRose, HindmarshRoseParams};
    use crate::traits::FnField;
    use approx::assert_abs_diff_eq;

    fn assert_gap_bounded(traj: &Trajectory, max_gap: f64) {
        let times = traj.times();
        assert_eq!(times[0], 0.0);
        for pair in times.windows(2) {
            assert!(pair[1] > pair[0], "times not increasing: {pair:?}");
            assert!(
                pair[1] - pair[0] <= max_gap + 1e-9,
                "gap {} exceeds {max_gap}",
                pair[1] - pair[0]
            );
        }
        assert_eq!(traj.states().len(), traj.len() * traj.dimension());
    }

    #[test]
    fn validate_rejects_bad_requests() {
        let ok = SamplingRequest::new(vec![0.0; 3], 10.0);
        assert_eq!(ok.validate(3), Ok(()));
        assert_eq!(ok.validate(0), Err(SamplerError::EmptyState));
        assert_eq!(
            ok.validate(2),
            Err(SamplerError::DimensionMismatch {
                expected: 2,
                got: 3
            })
        );

        let nan_state = SamplingRequest::new(vec![0.0, f64::NAN, 0.0], 10.0);
        assert_eq!(
            nan_state.validate(3),
            Err(SamplerError::NonFiniteInitialState { index: 1 })
        );

        let bad_horizon = SamplingRequest::new(vec![0.0; 3], 0.0);
        assert_eq!(bad_horizon.validate(3), Err(SamplerError::InvalidHorizon(0.0)));

        let bad_gap = ok.clone().with_max_gap(-1.0);
        assert_eq!(bad_gap.validate(3), Err(SamplerError::InvalidMaxGap(-1.0)));

        let bad_tol = ok.clone().with_tolerances(Tolerances::new(0.0, 1e-6));
        assert!(matches!(
            bad_tol.validate(3),
            Err(SamplerError::InvalidTolerance { .. })
        ));

        let too_dense = ok.with_max_gap(1e-12);
        assert!(matches!(
            too_dense.validate(3),
            Err(SamplerError::TooManySamples { .. })
        ));
    }

    #[test]
    fn sample_limit_bounds_the_reservation() {
        let limit = SamplingRequest::MAX_SAMPLES as f64;
        let at_limit = SamplingRequest::new(vec![0.0; 3], 900.0).with_max_gap(900.0 / limit);
        assert_eq!(at_limit.validate(3), Ok(()));
        assert!(at_limit.expected_samples() <= SamplingRequest::MAX_SAMPLES + 2);

        let past_limit = at_limit.clone().with_max_gap(2e-5);
        assert_eq!(
            past_limit.validate(3),
            Err(SamplerError::TooManySamples {
                requested: 900.0 / 2e-5,
                limit: SamplingRequest::MAX_SAMPLES,
            })
        );

        let mut sampler = TrajectorySampler::new(HindmarshRose);
        let result = sampler.compute_trajectory(&HindmarshRoseParams::default(), &past_limit);
        assert!(matches!(result, Err(SamplerError::TooManySamples { .. })));
        assert!(sampler.trajectory().is_empty());
    }

    #[test]
    fn reservation_tracks_one_sample_per_gap() {
        let request = SamplingRequest::new(vec![0.0], 10.0).with_max_gap(0.5);
        assert_eq!(request.expected_samples(), 22);
    }

    #[test]
    fn invalid_request_leaves_no_samples() {
        let mut sampler = TrajectorySampler::new(HindmarshRose);
        let request = SamplingRequest::new(vec![0.0; 2], 10.0);
        let result = sampler.compute_trajectory(&HindmarshRoseParams::default(), &request);
        assert!(result.is_err());
        assert!(sampler.trajectory().is_empty());
    }

    #[test]
    fn hindmarsh_rose_trajectory_is_gap_bounded() {
        let mut sampler = TrajectorySampler::new(HindmarshRose);
        let request = SamplingRequest::new(vec![0.0; 3], 200.0).with_max_gap(0.1);
        let traj = sampler
            .compute_trajectory(&HindmarshRoseParams::default(), &request)
            .expect("valid request");

        assert!(traj.is_complete());
        assert_gap_bounded(traj, 0.1);
        assert_eq!(traj.times().last().copied(), Some(200.0));
        assert!(traj.len() >= 2000);
        assert!(traj.stats().accepted_steps > 0);
    }

    #[test]
    fn first_interval_is_backfilled() {
        let field = FnField::new(1, |_t: f64, _x: &[f64], _p: &(), out: &mut [f64]| out[0] = 0.0);
        // Seed step atol * rtol = 0.64 already exceeds the gap.
        let request = SamplingRequest::new(vec![1.0], 1.0)
            .with_max_gap(0.3)
            .with_tolerances(Tolerances::new(0.5, 1.28));
        let traj = compute_trajectory(field, &(), &request).expect("valid request");

        assert_gap_bounded(&traj, 0.3);
        // 0 | 0.213 0.427 | 0.64 | 0.82 | 1.0
        assert_eq!(traj.len(), 6);
        assert_abs_diff_eq!(traj.times()[1], 0.64 / 3.0, epsilon = 1e-12);
        assert_eq!(traj.times()[3], 0.64);
        assert!(traj.component(0).all(|v| v == 1.0));
    }

    #[test]
    fn reused_sampler_resets_between_requests() {
        let mut sampler = TrajectorySampler::new(HindmarshRose);
        let params = HindmarshRoseParams::default();

        let long = SamplingRequest::new(vec![0.0; 3], 100.0);
        let long_len = sampler.compute_trajectory(&params, &long).expect("long").len();

        let short = SamplingRequest::new(vec![1.0, 0.0, 0.0], 10.0);
        let traj = sampler.compute_trajectory(&params, &short).expect("short");

        assert!(traj.len() < long_len);
        assert_eq!(traj.state(0), &[1.0, 0.0, 0.0]);
        assert_eq!(traj.times().last().copied(), Some(10.0));
        assert_gap_bounded(traj, SamplingRequest::DEFAULT_MAX_GAP);
    }

    #[test]
    fn nan_after_threshold_truncates_run() {
        let field = FnField::new(1, |t: f64, x: &[f64], _p: &(), out: &mut [f64]| {
            out[0] = if t > 2.0 { f64::NAN } else { -x[0] };
        });
        let request = SamplingRequest::new(vec![1.0], 10.0).with_max_gap(0.25);
        let traj = compute_trajectory(field, &(), &request).expect("valid request");

        match traj.status() {
            CompletionStatus::Truncated { at, reason } => {
                assert!(at <= 2.0);
                assert_eq!(traj.times().last().copied(), Some(at));
                assert!(matches!(reason, StepFailure::NonFinite { .. }));
            }
            CompletionStatus::Complete => panic!("expected truncation"),
        }
        assert!(!traj.is_complete());
        assert_gap_bounded(&traj, 0.25);
        assert!(traj.component(0).all(f64::is_finite));
    }

    #[test]
    fn take_trajectory_leaves_empty_buffer() {
        let mut sampler = TrajectorySampler::new(HindmarshRose);
        let request = SamplingRequest::new(vec![0.0; 3], 20.0);
        sampler
            .compute_trajectory(&HindmarshRoseParams::default(), &request)
            .expect("valid request");

        let taken = sampler.take_trajectory();
        assert!(!taken.is_empty());
        assert!(sampler.trajectory().is_empty());
        assert_abs_diff_eq!(taken.times()[taken.len() - 1], 20.0);
    }

    #[test]
    fn request_deserializes_with_defaults() {
        let request: SamplingRequest =
            serde_json::from_str(r#"{"initial_state": [1.0], "horizon": 5.0}"#).expect("json");
        assert_eq!(request.max_gap, SamplingRequest::DEFAULT_MAX_GAP);
        assert_eq!(request.tolerances, Tolerances::default());
    }
}
