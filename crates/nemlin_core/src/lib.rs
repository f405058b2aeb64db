pub mod config;
pub mod interpolation;
pub mod models;
pub mod sampler;
pub mod solvers;
pub mod trajectory;
/// The `nemlin_core` crate samples trajectories of small ODE systems (the
/// Hindmarsh-Rose neuron model in particular) for plotting.
///
/// Key components:
/// - **Traits**: `VectorField` (typed, pluggable right-hand side) and the `FnField` closure adapter.
/// - **Solvers**: Runge-Kutta-Fehlberg 4(5) stepper with standard step-size control.
/// - **Interpolation**: cubic Hermite backfill for steps longer than the output gap.
/// - **Sampler**: `TrajectorySampler`, which turns adaptive steps into a gap-bounded `Trajectory`.
/// - **Config**: keyed `ParameterSet` snapshots and slider metadata.
pub mod traits;

pub use config::{ParameterKey, ParameterSet};
pub use models::{Component, HindmarshRose, HindmarshRoseParams};
pub use sampler::{compute_trajectory, SamplerError, SamplingRequest, TrajectorySampler};
pub use solvers::{StepFailure, Tolerances};
pub use trajectory::{CompletionStatus, ComponentMask, Trajectory};
