//! Concrete neuron models.

use crate::traits::VectorField;
use crate::trajectory::ComponentMask;
use serde::{Deserialize, Serialize};

/// Coefficients of the Hindmarsh-Rose model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HindmarshRoseParams {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    /// Time scale of the slow adaptation current.
    pub r: f64,
    pub s: f64,
    /// Resting potential the slow variable relaxes towards (`X`).
    pub x_rest: f64,
    /// Applied current (`I`).
    pub current: f64,
}

impl Default for HindmarshRoseParams {
    fn default() -> Self {
        Self {
            a: 1.0,
            b: 2.7,
            c: 1.0,
            d: 5.0,
            r: 0.01,
            s: 4.0,
            x_rest: -1.3,
            current: 2.9,
        }
    }
}

/// State components of the Hindmarsh-Rose model, in state-vector order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Component {
    /// x(t), the membrane potential.
    MembranePotential,
    /// y(t), fast channels (spiking).
    Spiking,
    /// z(t), slow channels (bursting).
    Bursting,
}

impl Component {
    pub const ALL: [Component; 3] = [
        Component::MembranePotential,
        Component::Spiking,
        Component::Bursting,
    ];

    pub fn index(self) -> usize {
        match self {
            Component::MembranePotential => 0,
            Component::Spiking => 1,
            Component::Bursting => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Component::MembranePotential => "x(t) (membrane potential)",
            Component::Spiking => "y(t) (fast channels, spiking)",
            Component::Bursting => "z(t) (slow channels, bursting)",
        }
    }
}

impl From<Component> for ComponentMask {
    fn from(component: Component) -> Self {
        ComponentMask::single(component.index())
    }
}

impl FromIterator<Component> for ComponentMask {
    fn from_iter<I: IntoIterator<Item = Component>>(iter: I) -> Self {
        iter.into_iter()
            .fold(ComponentMask::empty(), |mask, c| mask.with(c.index()))
    }
}

/// The three-variable Hindmarsh-Rose neuron model.
///
/// ```text
/// dx/dt = x^2 (b - a x) + y - z + I
/// dy/dt = c - d x^2 - y
/// dz/dt = r (s (x - X) - z)
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct HindmarshRose;

impl HindmarshRose {
    pub const DIM: usize = 3;
}

impl VectorField for HindmarshRose {
    type Params = HindmarshRoseParams;

    fn dimension(&self) -> usize {
        Self::DIM
    }

    fn apply(&self, _t: f64, xs: &[f64], p: &HindmarshRoseParams, out: &mut [f64]) {
        let (x, y, z) = (xs[0], xs[1], xs[2]);
        let x2 = x * x;

        out[0] = x2 * (p.b - p.a * x) + y - z + p.current;
        out[1] = p.c - p.d * x2 - y;
        out[2] = p.r * (p.s * (x - p.x_rest) - z);
    }
}
