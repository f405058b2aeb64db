//! Keyed parameter snapshots for the Hindmarsh-Rose model.
//!
//! A UI edits one [`ParameterSet`] through single-character keys (the model
//! coefficients, the initial state and the horizon). Each edit yields a fresh
//! immutable snapshot that is turned into model parameters and a
//! [`SamplingRequest`] for the next run.

use crate::models::HindmarshRoseParams;
use crate::sampler::SamplingRequest;
use crate::solvers::Tolerances;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ParameterError {
    #[error("unknown parameter key '{0}'")]
    UnknownKey(char),
    #[error("parameter '{key}' must be finite, got {value}")]
    NonFinite { key: char, value: f64 },
}

/// Identifier of one entry of a [`ParameterSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterKey {
    A,
    B,
    C,
    D,
    R,
    S,
    XRest,
    Current,
    X0,
    Y0,
    Z0,
    Horizon,
}

impl ParameterKey {
    pub const ALL: [ParameterKey; 12] = [
        ParameterKey::A,
        ParameterKey::B,
        ParameterKey::C,
        ParameterKey::D,
        ParameterKey::R,
        ParameterKey::S,
        ParameterKey::XRest,
        ParameterKey::Current,
        ParameterKey::X0,
        ParameterKey::Y0,
        ParameterKey::Z0,
        ParameterKey::Horizon,
    ];

    pub fn as_char(self) -> char {
        match self {
            ParameterKey::A => 'a',
            ParameterKey::B => 'b',
            ParameterKey::C => 'c',
            ParameterKey::D => 'd',
            ParameterKey::R => 'r',
            ParameterKey::S => 's',
            ParameterKey::XRest => 'X',
            ParameterKey::Current => 'I',
            ParameterKey::X0 => 'x',
            ParameterKey::Y0 => 'y',
            ParameterKey::Z0 => 'z',
            ParameterKey::Horizon => 't',
        }
    }

    /// Slider range and default for this key.
    pub fn spec(self) -> ParameterSpec {
        let (min, max, default) = match self {
            ParameterKey::A => (-3.0, 3.0, 1.0),
            ParameterKey::B => (1.0, 5.0, 2.7),
            ParameterKey::C => (-3.0, 3.0, 1.0),
            ParameterKey::D => (-2.0, 9.0, 5.0),
            ParameterKey::R => (5e-4, 0.04, 1e-2),
            ParameterKey::S => (0.0, 8.0, 4.0),
            ParameterKey::XRest => (-5.0, 2.0, -1.3),
            ParameterKey::Current => (-9.0, 9.0, 2.9),
            ParameterKey::X0 | ParameterKey::Y0 | ParameterKey::Z0 => (-9.0, 9.0, 0.0),
            ParameterKey::Horizon => (20.0, 9e3, 9e2),
        };
        ParameterSpec {
            key: self.as_char(),
            min,
            max,
            default,
        }
    }
}

impl TryFrom<char> for ParameterKey {
    type Error = ParameterError;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        ParameterKey::ALL
            .into_iter()
            .find(|k| k.as_char() == c)
            .ok_or(ParameterError::UnknownKey(c))
    }
}

/// Range metadata a UI can build a control from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub key: char,
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

impl ParameterSpec {
    /// Decimal digits worth displaying: narrow ranges get one more.
    pub fn precision(&self) -> u32 {
        if (self.max - self.min).abs() < 0.1 {
            3
        } else {
            2
        }
    }

    /// Smallest meaningful increment at the display precision.
    pub fn step(&self) -> f64 {
        10f64.powi(-(self.precision() as i32))
    }
}

pub fn parameter_specs() -> Vec<ParameterSpec> {
    ParameterKey::ALL.into_iter().map(ParameterKey::spec).collect()
}

/// Complete parameter snapshot: model coefficients, initial state and
/// integration horizon. Serialised with the single-character keys.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterSet {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub r: f64,
    pub s: f64,
    #[serde(rename = "X")]
    pub x_rest: f64,
    #[serde(rename = "I")]
    pub current: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(rename = "t")]
    pub horizon: f64,
}

impl Default for ParameterSet {
    fn default() -> Self {
        let mut set = Self {
            a: 0.0,
            b: 0.0,
            c: 0.0,
            d: 0.0,
            r: 0.0,
            s: 0.0,
            x_rest: 0.0,
            current: 0.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
            horizon: 0.0,
        };
        for key in ParameterKey::ALL {
            *set.slot(key) = key.spec().default;
        }
        set
    }
}

impl ParameterSet {
    /// Builds a set from keyed values on top of the defaults.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, ParameterError>
    where
        I: IntoIterator<Item = (char, f64)>,
    {
        let mut set = Self::default();
        for (key, value) in pairs {
            set.set(ParameterKey::try_from(key)?, value)?;
        }
        Ok(set)
    }

    fn slot(&mut self, key: ParameterKey) -> &mut f64 {
        match key {
            ParameterKey::A => &mut self.a,
            ParameterKey::B => &mut self.b,
            ParameterKey::C => &mut self.c,
            ParameterKey::D => &mut self.d,
            ParameterKey::R => &mut self.r,
            ParameterKey::S => &mut self.s,
            ParameterKey::XRest => &mut self.x_rest,
            ParameterKey::Current => &mut self.current,
            ParameterKey::X0 => &mut self.x,
            ParameterKey::Y0 => &mut self.y,
            ParameterKey::Z0 => &mut self.z,
            ParameterKey::Horizon => &mut self.horizon,
        }
    }

    pub fn get(&self, key: ParameterKey) -> f64 {
        match key {
            ParameterKey::A => self.a,
            ParameterKey::B => self.b,
            ParameterKey::C => self.c,
            ParameterKey::D => self.d,
            ParameterKey::R => self.r,
            ParameterKey::S => self.s,
            ParameterKey::XRest => self.x_rest,
            ParameterKey::Current => self.current,
            ParameterKey::X0 => self.x,
            ParameterKey::Y0 => self.y,
            ParameterKey::Z0 => self.z,
            ParameterKey::Horizon => self.horizon,
        }
    }

    pub fn set(&mut self, key: ParameterKey, value: f64) -> Result<(), ParameterError> {
        if !value.is_finite() {
            return Err(ParameterError::NonFinite {
                key: key.as_char(),
                value,
            });
        }
        *self.slot(key) = value;
        Ok(())
    }

    /// Returns a copy with one entry replaced.
    pub fn with(mut self, key: ParameterKey, value: f64) -> Result<Self, ParameterError> {
        self.set(key, value)?;
        Ok(self)
    }

    pub fn model_params(&self) -> HindmarshRoseParams {
        HindmarshRoseParams {
            a: self.a,
            b: self.b,
            c: self.c,
            d: self.d,
            r: self.r,
            s: self.s,
            x_rest: self.x_rest,
            current: self.current,
        }
    }

    pub fn initial_state(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn request(&self, max_gap: f64, tolerances: Tolerances) -> SamplingRequest {
        SamplingRequest::new(self.initial_state().to_vec(), self.horizon)
            .with_max_gap(max_gap)
            .with_tolerances(tolerances)
    }
}
