//! Sampled trajectories and the component mask used to select what a
//! renderer draws from them.

use crate::solvers::{StepFailure, StepStats};
use serde::{Deserialize, Serialize};
use std::collections::TryReserveError;

/// How an integration run ended.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CompletionStatus {
    /// The horizon was reached.
    Complete,
    /// The stepper failed; samples up to `at` are still valid.
    Truncated { at: f64, reason: StepFailure },
}

/// Time-ordered samples of a single integration run.
///
/// States are stored row-major: sample `i` occupies
/// `states[i * dim..(i + 1) * dim]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    dim: usize,
    times: Vec<f64>,
    states: Vec<f64>,
    status: CompletionStatus,
    stats: StepStats,
}

impl Trajectory {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            times: Vec::new(),
            states: Vec::new(),
            status: CompletionStatus::Complete,
            stats: StepStats::default(),
        }
    }

    /// Clears all samples while keeping the allocated storage.
    pub(crate) fn clear(&mut self, dim: usize) {
        self.dim = dim;
        self.times.clear();
        self.states.clear();
        self.status = CompletionStatus::Complete;
        self.stats = StepStats::default();
    }

    /// Clears the buffer and makes room for `capacity` samples.
    ///
    /// On failure the buffer is left empty and nothing is aborted.
    pub(crate) fn reset(&mut self, dim: usize, capacity: usize) -> Result<(), TryReserveError> {
        self.clear(dim);
        self.times.try_reserve(capacity)?;
        self.states
            .try_reserve(capacity.checked_mul(dim).unwrap_or(usize::MAX))?;
        Ok(())
    }

    pub(crate) fn push(&mut self, t: f64, state: &[f64]) -> Result<(), TryReserveError> {
        debug_assert_eq!(state.len(), self.dim);
        self.times.try_reserve(1)?;
        self.states.try_reserve(state.len())?;
        self.times.push(t);
        self.states.extend_from_slice(state);
        Ok(())
    }

    pub(crate) fn finish(&mut self, status: CompletionStatus, stats: StepStats) {
        self.status = status;
        self.stats = stats;
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Flat row-major state storage.
    pub fn states(&self) -> &[f64] {
        &self.states
    }

    pub fn state(&self, index: usize) -> &[f64] {
        &self.states[index * self.dim..(index + 1) * self.dim]
    }

    pub fn samples(&self) -> impl Iterator<Item = (f64, &[f64])> + '_ {
        self.times
            .iter()
            .copied()
            .zip(self.states.chunks_exact(self.dim.max(1)))
    }

    /// Values of one state component across all samples.
    pub fn component(&self, index: usize) -> impl Iterator<Item = f64> + '_ {
        assert!(index < self.dim, "component index out of range");
        self.states.iter().skip(index).step_by(self.dim).copied()
    }

    pub fn last(&self) -> Option<(f64, &[f64])> {
        let t = *self.times.last()?;
        Some((t, self.state(self.times.len() - 1)))
    }

    pub fn status(&self) -> CompletionStatus {
        self.status
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.status, CompletionStatus::Complete)
    }

    pub fn stats(&self) -> StepStats {
        self.stats
    }

    /// Largest absolute value reached by one component, or 0.0 when empty.
    pub fn max_abs(&self, index: usize) -> f64 {
        self.component(index).fold(0.0, |acc, v| acc.max(v.abs()))
    }

    /// Largest absolute value over the enabled components.
    ///
    /// An all-zero trajectory yields 0.0; callers deriving a display scale
    /// from this must handle that case themselves.
    pub fn max_abs_enabled(&self, mask: ComponentMask) -> f64 {
        mask.iter(self.dim)
            .map(|i| self.max_abs(i))
            .fold(0.0, f64::max)
    }
}

/// A set of enabled state components, one bit per component index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentMask(u32);

impl ComponentMask {
    pub const CAPACITY: usize = u32::BITS as usize;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Every component of a `dim`-dimensional state.
    pub fn all(dim: usize) -> Self {
        if dim >= Self::CAPACITY {
            Self(u32::MAX)
        } else {
            Self((1u32 << dim) - 1)
        }
    }

    pub fn single(index: usize) -> Self {
        Self::empty().with(index)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub fn with(mut self, index: usize) -> Self {
        self.insert(index);
        self
    }

    pub fn insert(&mut self, index: usize) {
        assert!(index < Self::CAPACITY, "component index out of range");
        self.0 |= 1 << index;
    }

    pub fn remove(&mut self, index: usize) {
        if index < Self::CAPACITY {
            self.0 &= !(1 << index);
        }
    }

    pub fn set(&mut self, index: usize, enabled: bool) {
        if enabled {
            self.insert(index);
        } else {
            self.remove(index);
        }
    }

    pub fn contains(self, index: usize) -> bool {
        index < Self::CAPACITY && self.0 & (1 << index) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Enabled component indices below `dim`, ascending.
    pub fn iter(self, dim: usize) -> impl Iterator<Item = usize> {
        (0..dim.min(Self::CAPACITY)).filter(move |&i| self.contains(i))
    }
}
