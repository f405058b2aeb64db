use crate::traits::VectorField;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

/// Mixed absolute/relative error tolerances.
///
/// A component passes when `|err_i| <= atol + rtol * |x_i|`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerances {
    pub atol: f64,
    pub rtol: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            atol: 1e-4,
            rtol: 1e-4,
        }
    }
}

impl Tolerances {
    pub fn new(atol: f64, rtol: f64) -> Self {
        Self { atol, rtol }
    }

    /// Seed step for a fresh run.
    pub fn initial_step(&self) -> f64 {
        self.atol * self.rtol
    }

    /// Largest per-component ratio of error to allowed error. NaN if any
    /// component is NaN.
    pub fn error_ratio(&self, err: &[f64], state: &[f64]) -> f64 {
        err.iter()
            .zip(state)
            .map(|(e, x)| e.abs() / (self.atol + self.rtol * x.abs()))
            .fold(0.0, |acc, r| if r.is_nan() || r > acc { r } else { acc })
    }
}

/// Tuning knobs for the step-size controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepperSettings {
    pub safety: f64,
    /// Smallest factor a rejected step may shrink by.
    pub min_factor: f64,
    /// Largest factor an accepted step may grow by.
    pub max_factor: f64,
    /// Steps below this magnitude count as underflow.
    pub min_step: f64,
}

impl Default for StepperSettings {
    fn default() -> Self {
        Self {
            safety: 0.9,
            min_factor: 0.2,
            max_factor: 5.0,
            min_step: f64::MIN_POSITIVE,
        }
    }
}

/// Why the stepper could not advance.
#[derive(Debug, Clone, Copy, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum StepFailure {
    #[error("non-finite state or error estimate at t = {t}")]
    NonFinite { t: f64 },
    #[error("step size underflow at t = {t} (h = {h:e})")]
    StepUnderflow { t: f64, h: f64 },
}

/// Per-run stepper counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepStats {
    pub accepted_steps: u64,
    pub rejected_steps: u64,
    pub evaluations: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepDecision {
    Accept { next: f64 },
    Reject { retry: f64 },
}

/// Standard step-size control for an embedded pair of order `q`.
#[derive(Debug, Clone, Copy)]
pub struct StepController {
    pub tolerances: Tolerances,
    pub settings: StepperSettings,
    order: u32,
}

impl StepController {
    pub fn new(tolerances: Tolerances, settings: StepperSettings, order: u32) -> Self {
        Self {
            tolerances,
            settings,
            order,
        }
    }

    /// Maps the error ratio of a step of size `h` to a decision.
    pub fn decide(&self, h: f64, ratio: f64) -> StepDecision {
        let q = f64::from(self.order);
        let s = &self.settings;

        if ratio > 1.0 {
            let factor = (s.safety * ratio.powf(-1.0 / q)).max(s.min_factor);
            return StepDecision::Reject { retry: h * factor };
        }

        let factor = if ratio < 0.5 {
            if ratio == 0.0 {
                s.max_factor
            } else {
                (s.safety * ratio.powf(-1.0 / (q + 1.0))).clamp(1.0, s.max_factor)
            }
        } else {
            1.0
        };
        StepDecision::Accept { next: h * factor }
    }
}

/// Runge-Kutta-Fehlberg 4(5) stepper with embedded error estimate.
pub struct Rkf45 {
    k1: Vec<f64>,
    k2: Vec<f64>,
    k3: Vec<f64>,
    k4: Vec<f64>,
    k5: Vec<f64>,
    k6: Vec<f64>,
    tmp: Vec<f64>,
    y_new: Vec<f64>,
    err: Vec<f64>,
    stats: StepStats,
}

impl Rkf45 {
    pub const ORDER: u32 = 5;

    pub fn new(dim: usize) -> Self {
        Self {
            k1: vec![0.0; dim],
            k2: vec![0.0; dim],
            k3: vec![0.0; dim],
            k4: vec![0.0; dim],
            k5: vec![0.0; dim],
            k6: vec![0.0; dim],
            tmp: vec![0.0; dim],
            y_new: vec![0.0; dim],
            err: vec![0.0; dim],
            stats: StepStats::default(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.tmp.len()
    }

    pub fn stats(&self) -> StepStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = StepStats::default();
    }

    /// Advances `state` from `t` by one accepted step, retrying internally
    /// with smaller steps until the error test passes.
    ///
    /// `h` is the trial step on entry and the proposal for the following
    /// call on exit. Steps never pass `t_end`; a step clipped to reach it
    /// lands on `t_end` exactly. On failure `t`, `state` and `h` are left
    /// untouched.
    #[allow(clippy::too_many_arguments)]
    pub fn advance<F: VectorField>(
        &mut self,
        field: &F,
        params: &F::Params,
        controller: &StepController,
        t: &mut f64,
        state: &mut [f64],
        h: &mut f64,
        t_end: f64,
    ) -> Result<(), StepFailure> {
        let t0 = *t;
        let remaining = t_end - t0;
        let mut trial = *h;

        loop {
            let clipped = trial >= remaining;
            let step = if clipped { remaining } else { trial };

            if step < controller.settings.min_step || t0 + step == t0 {
                return Err(StepFailure::StepUnderflow { t: t0, h: step });
            }

            self.attempt(field, params, t0, state, step);
            let ratio = controller.tolerances.error_ratio(&self.err, &self.y_new);

            if !ratio.is_finite() || self.y_new.iter().any(|v| !v.is_finite()) {
                return Err(StepFailure::NonFinite { t: t0 });
            }

            match controller.decide(step, ratio) {
                StepDecision::Accept { next } => {
                    self.stats.accepted_steps += 1;
                    state.copy_from_slice(&self.y_new);
                    *t = if clipped { t_end } else { (t0 + step).min(t_end) };
                    *h = next;
                    return Ok(());
                }
                StepDecision::Reject { retry } => {
                    self.stats.rejected_steps += 1;
                    trace!(t = t0, h = step, ratio, "rejected step");
                    trial = retry;
                }
            }
        }
    }

    /// One Fehlberg step of size `dt` from `(t0, y)` into `y_new`, with the
    /// local error estimate in `err`.
    fn attempt<F: VectorField>(
        &mut self,
        field: &F,
        params: &F::Params,
        t0: f64,
        y: &[f64],
        dt: f64,
    ) {
        const C2: f64 = 1.0 / 4.0;
        const C3: f64 = 3.0 / 8.0;
        const C4: f64 = 12.0 / 13.0;
        const C5: f64 = 1.0;
        const C6: f64 = 1.0 / 2.0;

        const A21: f64 = 1.0 / 4.0;
        const A31: f64 = 3.0 / 32.0;
        const A32: f64 = 9.0 / 32.0;
        const A41: f64 = 1932.0 / 2197.0;
        const A42: f64 = -7200.0 / 2197.0;
        const A43: f64 = 7296.0 / 2197.0;
        const A51: f64 = 439.0 / 216.0;
        const A52: f64 = -8.0;
        const A53: f64 = 3680.0 / 513.0;
        const A54: f64 = -845.0 / 4104.0;
        const A61: f64 = -8.0 / 27.0;
        const A62: f64 = 2.0;
        const A63: f64 = -3544.0 / 2565.0;
        const A64: f64 = 1859.0 / 4104.0;
        const A65: f64 = -11.0 / 40.0;

        // 5th order weights
        const B1: f64 = 16.0 / 135.0;
        const B3: f64 = 6656.0 / 12825.0;
        const B4: f64 = 28561.0 / 56430.0;
        const B5: f64 = -9.0 / 50.0;
        const B6: f64 = 2.0 / 55.0;

        // 5th minus 4th order weights
        const E1: f64 = 1.0 / 360.0;
        const E3: f64 = -128.0 / 4275.0;
        const E4: f64 = -2197.0 / 75240.0;
        const E5: f64 = 1.0 / 50.0;
        const E6: f64 = 2.0 / 55.0;

        let n = y.len();

        // k1
        field.apply(t0, y, params, &mut self.k1);

        // k2
        for i in 0..n {
            self.tmp[i] = y[i] + dt * (A21 * self.k1[i]);
        }
        field.apply(t0 + C2 * dt, &self.tmp, params, &mut self.k2);

        // k3
        for i in 0..n {
            self.tmp[i] = y[i] + dt * (A31 * self.k1[i] + A32 * self.k2[i]);
        }
        field.apply(t0 + C3 * dt, &self.tmp, params, &mut self.k3);

        // k4
        for i in 0..n {
            self.tmp[i] = y[i] + dt * (A41 * self.k1[i] + A42 * self.k2[i] + A43 * self.k3[i]);
        }
        field.apply(t0 + C4 * dt, &self.tmp, params, &mut self.k4);

        // k5
        for i in 0..n {
            self.tmp[i] = y[i]
                + dt * (A51 * self.k1[i] + A52 * self.k2[i] + A53 * self.k3[i] + A54 * self.k4[i]);
        }
        field.apply(t0 + C5 * dt, &self.tmp, params, &mut self.k5);

        // k6
        for i in 0..n {
            self.tmp[i] = y[i]
                + dt * (A61 * self.k1[i]
                    + A62 * self.k2[i]
                    + A63 * self.k3[i]
                    + A64 * self.k4[i]
                    + A65 * self.k5[i]);
        }
        field.apply(t0 + C6 * dt, &self.tmp, params, &mut self.k6);

        for i in 0..n {
            self.y_new[i] = y[i]
                + dt * (B1 * self.k1[i]
                    + B3 * self.k3[i]
                    + B4 * self.k4[i]
                    + B5 * self.k5[i]
                    + B6 * self.k6[i]);
            self.err[i] = dt
                * (E1 * self.k1[i]
                    + E3 * self.k3[i]
                    + E4 * self.k4[i]
                    + E5 * self.k5[i]
                    + E6 * self.k6[i]);
        }

        self.stats.evaluations += 6;
    }
}
