//! End-to-end sampling scenarios.

use approx::assert_abs_diff_eq;
use nemlin_core::solvers::StepperSettings;
use nemlin_core::traits::FnField;
use nemlin_core::{
    compute_trajectory, CompletionStatus, Component, ComponentMask, HindmarshRose,
    HindmarshRoseParams, ParameterKey, ParameterSet, SamplingRequest, StepFailure, Tolerances,
    Trajectory, TrajectorySampler,
};

fn assert_monotone_and_gap_bounded(traj: &Trajectory, max_gap: f64) {
    let times = traj.times();
    assert!(traj.len() >= 2, "trajectory must hold at least two samples");
    assert_eq!(times[0], 0.0);
    for (i, pair) in times.windows(2).enumerate() {
        let gap = pair[1] - pair[0];
        assert!(gap > 0.0, "non-increasing time at sample {i}: {pair:?}");
        assert!(gap <= max_gap + 1e-9, "gap {gap} > {max_gap} at sample {i}");
    }
}

#[test]
fn exponential_decay_tracks_closed_form() {
    let field = FnField::new(1, |_t: f64, x: &[f64], _p: &(), out: &mut [f64]| out[0] = -x[0]);
    let request = SamplingRequest::new(vec![1.0], 5.0)
        .with_max_gap(0.5)
        .with_tolerances(Tolerances::new(1e-6, 1e-6));

    let traj = compute_trajectory(field, &(), &request).expect("valid request");

    assert!(traj.is_complete());
    assert_monotone_and_gap_bounded(&traj, 0.5);
    assert!(traj.times().last().copied().unwrap_or_default() >= 5.0 - 1e-12);
    for (t, x) in traj.samples() {
        assert_abs_diff_eq!(x[0], (-t).exp(), epsilon = 1e-4);
    }
}

#[test]
fn constant_field_keeps_state_and_takes_large_steps() {
    let field = FnField::new(3, |_t: f64, _x: &[f64], _p: &(), out: &mut [f64]| out.fill(0.0));
    let request = SamplingRequest::new(vec![1.5, -2.0, 0.25], 10.0).with_max_gap(0.5);

    let traj = compute_trajectory(field, &(), &request).expect("valid request");

    assert!(traj.is_complete());
    assert_monotone_and_gap_bounded(&traj, 0.5);
    for (_, x) in traj.samples() {
        assert_eq!(x, &[1.5, -2.0, 0.25]);
    }

    let stats = traj.stats();
    assert_eq!(stats.rejected_steps, 0);
    // Seed step 1e-8 grows by the maximum factor every step.
    assert!(stats.accepted_steps < 20, "took {} steps", stats.accepted_steps);
    // Gap resampling alone sets the density.
    assert!(traj.len() >= 21 && traj.len() < 40);
}

#[test]
fn tiny_gap_forces_dense_interpolation() {
    let mut sampler = TrajectorySampler::new(HindmarshRose);
    let request = SamplingRequest::new(vec![-1.0, 0.0, 0.0], 20.0).with_max_gap(1e-3);

    let traj = sampler
        .compute_trajectory(&HindmarshRoseParams::default(), &request)
        .expect("valid request");

    assert!(traj.is_complete());
    assert_monotone_and_gap_bounded(traj, 1e-3);
    assert!(traj.len() >= 20_000);
}

#[test]
fn field_failing_past_a_time_truncates_at_last_accepted_step() {
    // Decays normally, then turns non-finite for any stage beyond t = 3.
    let field = FnField::new(1, |t: f64, x: &[f64], _p: &(), out: &mut [f64]| {
        out[0] = if t > 3.0 { f64::INFINITY } else { -x[0] };
    });
    let request = SamplingRequest::new(vec![1.0], 100.0).with_max_gap(0.25);

    let traj = compute_trajectory(&field, &(), &request).expect("valid request");

    let last = traj.times().last().copied().expect("initial sample");
    match traj.status() {
        CompletionStatus::Truncated { at, reason } => {
            assert_eq!(at, last);
            assert_eq!(reason, StepFailure::NonFinite { t: at });
            // The failing step started at the last accepted endpoint and
            // reached past 3, so that endpoint is at most one step short.
            assert!(at <= 3.0 && at > 1.5, "truncated at {at}");
        }
        CompletionStatus::Complete => panic!("expected truncated run"),
    }
    assert!(traj.stats().accepted_steps >= 2);
    assert_abs_diff_eq!(traj.state(traj.len() - 1)[0], (-last).exp(), epsilon = 1e-3);
    assert_monotone_and_gap_bounded(&traj, 0.25);
}

#[test]
fn underflow_truncates_instead_of_looping() {
    // dx/dt = x^2 from x = 1 blows up at t = 1.
    let field = FnField::new(1, |_t: f64, x: &[f64], _p: &(), out: &mut [f64]| out[0] = x[0] * x[0]);
    let settings = StepperSettings {
        min_step: 1e-9,
        ..StepperSettings::default()
    };
    let mut sampler = TrajectorySampler::with_settings(field, settings);
    let request = SamplingRequest::new(vec![1.0], 2.0)
        .with_tolerances(Tolerances::new(1e-8, 1e-8))
        .with_max_gap(0.05);

    let traj = sampler.compute_trajectory(&(), &request).expect("valid request");

    assert!(!traj.is_complete());
    let (t_last, x_last) = traj.last().expect("samples");
    assert!(t_last < 1.0);
    assert!(x_last[0].is_finite());
    assert_monotone_and_gap_bounded(traj, 0.05);
}

#[test]
fn parameter_snapshots_drive_fresh_runs() {
    let mut sampler = TrajectorySampler::new(HindmarshRose);
    let base = ParameterSet::default()
        .with(ParameterKey::Horizon, 100.0)
        .expect("finite");

    let quiet = base.with(ParameterKey::Current, -2.0).expect("finite");
    let quiet_request = quiet.request(0.1, Tolerances::default());
    let quiet_traj = sampler
        .compute_trajectory(&quiet.model_params(), &quiet_request)
        .expect("valid request");
    let quiet_peak = quiet_traj.component(0).fold(f64::NEG_INFINITY, f64::max);
    let quiet_len = quiet_traj.len();

    let driven = base.with(ParameterKey::Current, 3.0).expect("finite");
    let driven_request = driven.request(0.1, Tolerances::default());
    let traj = sampler
        .compute_trajectory(&driven.model_params(), &driven_request)
        .expect("valid request");

    // With a negative current the neuron stays hyperpolarized.
    assert!(quiet_peak <= 0.0);
    assert!(traj.component(0).any(|x| x > 1.0));
    assert!(traj.is_complete());
    assert_eq!(traj.times().last().copied(), Some(100.0));
    assert!(quiet_len >= 1001 && traj.len() >= 1001);
    assert!(traj.max_abs_enabled(Component::MembranePotential.into()) > 1.0);
}

#[test]
fn all_zero_trajectory_reports_zero_scale() {
    let field = FnField::new(2, |_t: f64, _x: &[f64], _p: &(), out: &mut [f64]| out.fill(0.0));
    let request = SamplingRequest::new(vec![0.0, 0.0], 3.0);

    let traj = compute_trajectory(field, &(), &request).expect("valid request");

    assert_eq!(traj.max_abs_enabled(ComponentMask::all(2)), 0.0);
}
