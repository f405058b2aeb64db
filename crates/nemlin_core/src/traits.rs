use std::fmt;
use std::marker::PhantomData;

/// A vector field dx/dt = f(t, x; p) over a fixed-dimension state space.
///
/// Implementations must be pure: the same `(t, x, params)` always produces the
/// same derivative. Non-finite output is allowed and is reported downstream by
/// the stepper rather than here.
pub trait VectorField {
    /// Parameters fed to the field on every evaluation. Immutable during a run.
    type Params;

    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// t: current time
    /// x: current state
    /// params: parameter snapshot for this run
    /// out: buffer to write dx/dt into
    fn apply(&self, t: f64, x: &[f64], params: &Self::Params, out: &mut [f64]);
}

/// Wraps a closure as a [`VectorField`] with a declared dimension.
pub struct FnField<P, F> {
    dim: usize,
    f: F,
    _params: PhantomData<fn(&P)>,
}

impl<P, F> FnField<P, F>
where
    F: Fn(f64, &[f64], &P, &mut [f64]),
{
    pub fn new(dim: usize, f: F) -> Self {
        Self {
            dim,
            f,
            _params: PhantomData,
        }
    }
}

impl<P, F> VectorField for FnField<P, F>
where
    F: Fn(f64, &[f64], &P, &mut [f64]),
{
    type Params = P;

    fn dimension(&self) -> usize {
        self.dim
    }

    fn apply(&self, t: f64, x: &[f64], params: &P, out: &mut [f64]) {
        (self.f)(t, x, params, out)
    }
}

impl<P, F> fmt::Debug for FnField<P, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnField").field("dim", &self.dim).finish()
    }
}

impl<V: VectorField + ?Sized> VectorField for &V {
    type Params = V::Params;

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn apply(&self, t: f64, x: &[f64], params: &Self::Params, out: &mut [f64]) {
        (**self).apply(t, x, params, out)
    }
}
