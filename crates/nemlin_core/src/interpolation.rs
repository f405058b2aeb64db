//! Cubic Hermite reconstruction between two accepted solver samples.

/// Endpoint data of one accepted step: times, states and derivatives at both
/// ends of `[t0, t1]`.
#[derive(Debug, Clone, Copy)]
pub struct HermiteSegment<'a> {
    pub t0: f64,
    pub t1: f64,
    pub x0: &'a [f64],
    pub x1: &'a [f64],
    pub dx0: &'a [f64],
    pub dx1: &'a [f64],
}

impl HermiteSegment<'_> {
    pub fn duration(&self) -> f64 {
        self.t1 - self.t0
    }

    /// Time at normalized offset `p`.
    pub fn time_at(&self, p: f64) -> f64 {
        self.t0 + p * self.duration()
    }

    /// Writes the interpolated state at normalized offset `p` in `[0, 1]`
    /// into `out`.
    ///
    /// Reproduces `x0` at `p = 0` and `x1` at `p = 1` exactly, and a
    /// constant component with zero slopes at every `p`.
    pub fn eval(&self, p: f64, out: &mut [f64]) {
        let dt = self.duration();
        let q = 1.0 - p;

        for i in 0..out.len() {
            let dx = self.x1[i] - self.x0[i];
            let a = self.dx0[i] * dt - dx;
            let b = -self.dx1[i] * dt + dx;

            // anchor on the nearer endpoint; q*x0 + p*x1 drifts when x0 == x1
            let linear = if p < 0.5 {
                self.x0[i] + p * dx
            } else {
                self.x1[i] - q * dx
            };
            out[i] = linear + p * q * (a * q + b * p);
        }
    }

    /// Number of equal sub-intervals needed so none exceeds `max_gap`.
    pub fn subdivisions(&self, max_gap: f64) -> usize {
        let n = (self.duration() / max_gap).ceil();
        if n.is_finite() && n >= 1.0 {
            n as usize
        } else {
            1
        }
    }
}
