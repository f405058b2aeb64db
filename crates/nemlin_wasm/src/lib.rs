//! Browser bindings for `nemlin_core`.
//!
//! Exposes a single stateful [`WasmSampler`] that keeps the current
//! Hindmarsh-Rose parameter snapshot and component selection, and returns
//! freshly sampled trajectories as plain JS objects.

mod system;

pub use system::WasmSampler;
