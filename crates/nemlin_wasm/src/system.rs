//! Core WASM sampler wrapper.
//!
//! The browser side owns sliders and checkboxes; every change is forwarded
//! here, folded into a fresh parameter snapshot and answered with a newly
//! sampled trajectory.

use anyhow::{Context, Result};
use nemlin_core::config::{parameter_specs, ParameterKey, ParameterSet};
use nemlin_core::solvers::Tolerances;
use nemlin_core::traits::VectorField;
use nemlin_core::trajectory::{CompletionStatus, ComponentMask};
use nemlin_core::{Component, HindmarshRose, SamplingRequest, TrajectorySampler};
use js_sys::Float64Array;
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// What the renderer needs to draw one frame.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct TrajectoryView {
    pub dim: usize,
    pub times: Vec<f64>,
    /// Row-major, `dim` values per sample.
    pub states: Vec<f64>,
    pub enabled: u32,
    /// Largest magnitude over the enabled components. Zero when they are
    /// identically zero; the renderer must not divide by it blindly.
    pub max_abs: f64,
    pub status: CompletionStatus,
}

#[wasm_bindgen]
pub struct WasmSampler {
    sampler: TrajectorySampler<HindmarshRose>,
    params: ParameterSet,
    enabled: ComponentMask,
    max_gap: f64,
    tolerances: Tolerances,
}

impl Default for WasmSampler {
    fn default() -> Self {
        Self {
            sampler: TrajectorySampler::new(HindmarshRose),
            params: ParameterSet::default(),
            enabled: Component::MembranePotential.into(),
            max_gap: SamplingRequest::DEFAULT_MAX_GAP,
            tolerances: Tolerances::default(),
        }
    }
}

fn to_js(err: anyhow::Error) -> JsValue {
    JsValue::from_str(&format!("{err:#}"))
}

impl WasmSampler {
    pub(crate) fn update_parameter(&mut self, key: char, value: f64) -> Result<()> {
        let key = ParameterKey::try_from(key)?;
        self.params = self
            .params
            .with(key, value)
            .with_context(|| format!("Failed to update parameter '{}'.", key.as_char()))?;
        Ok(())
    }

    pub(crate) fn update_component(&mut self, index: usize, enabled: bool) -> Result<()> {
        let dim = self.sampler.field().dimension();
        if index >= dim {
            anyhow::bail!("Component index {index} out of range for a {dim}-dimensional model.");
        }
        self.enabled.set(index, enabled);
        Ok(())
    }

    pub(crate) fn series(&self, index: usize) -> Result<Vec<f64>> {
        let traj = self.sampler.trajectory();
        if index >= traj.dimension() {
            anyhow::bail!(
                "Component index {index} out of range for a {}-dimensional trajectory.",
                traj.dimension()
            );
        }
        Ok(traj.component(index).collect())
    }

    pub(crate) fn run(&mut self) -> Result<TrajectoryView> {
        let snapshot = self.params;
        let request = snapshot.request(self.max_gap, self.tolerances);
        let traj = self
            .sampler
            .compute_trajectory(&snapshot.model_params(), &request)
            .context("Failed to sample trajectory.")?;

        Ok(TrajectoryView {
            dim: traj.dimension(),
            times: traj.times().to_vec(),
            states: traj.states().to_vec(),
            enabled: self.enabled.bits(),
            max_abs: traj.max_abs_enabled(self.enabled),
            status: traj.status(),
        })
    }
}

#[wasm_bindgen]
impl WasmSampler {
    #[wasm_bindgen(constructor)]
    pub fn new() -> WasmSampler {
        console_error_panic_hook::set_once();
        WasmSampler::default()
    }

    pub fn set_parameter(&mut self, key: char, value: f64) -> Result<(), JsValue> {
        self.update_parameter(key, value).map_err(to_js)
    }

    pub fn get_parameter(&self, key: char) -> Result<f64, JsValue> {
        ParameterKey::try_from(key)
            .map(|k| self.params.get(k))
            .map_err(|err| to_js(err.into()))
    }

    pub fn set_max_gap(&mut self, max_gap: f64) {
        self.max_gap = max_gap;
    }

    pub fn set_tolerances(&mut self, atol: f64, rtol: f64) {
        self.tolerances = Tolerances::new(atol, rtol);
    }

    pub fn set_component_enabled(&mut self, index: usize, enabled: bool) -> Result<(), JsValue> {
        self.update_component(index, enabled).map_err(to_js)
    }

    pub fn enabled_components(&self) -> u32 {
        self.enabled.bits()
    }

    /// Samples the current snapshot and returns a `TrajectoryView` object.
    pub fn compute(&mut self) -> Result<JsValue, JsValue> {
        let view = self.run().map_err(to_js)?;
        serde_wasm_bindgen::to_value(&view)
            .map_err(|err| JsValue::from_str(&format!("Failed to serialize trajectory: {err}")))
    }

    /// Sample times of the most recent `compute` call.
    pub fn times(&self) -> Float64Array {
        Float64Array::from(self.sampler.trajectory().times())
    }

    /// One state component of the most recent `compute` call, aligned with
    /// `times()`.
    pub fn component_series(&self, index: usize) -> Result<Float64Array, JsValue> {
        let values = self.series(index).map_err(to_js)?;
        Ok(Float64Array::from(values.as_slice()))
    }

    /// Slider metadata for every parameter key.
    pub fn parameter_specs() -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&parameter_specs())
            .map_err(|err| JsValue::from_str(&format!("Failed to serialize specs: {err}")))
    }

    pub fn component_labels() -> Vec<String> {
        Component::ALL.iter().map(|c| c.label().to_string()).collect()
    }
}
