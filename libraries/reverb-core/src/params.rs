//! Parameter model
//!
//! Stages read their settings through [`ParameterSource`], a keyed lookup that
//! distinguishes a missing key from a value of the wrong kind. The engine hands
//! stages an owned [`ParameterSnapshot`] so that the audio thread never reads
//! through a lock held by the control thread.
//!
//! # Example
//!
//! ```rust
//! use reverb_core::params::{ids, ParameterSnapshot, ParameterSource};
//!
//! let mut params = ParameterSnapshot::defaults();
//! params.set_float(ids::PREDELAY, 20.0);
//! assert_eq!(params.float(ids::PREDELAY).unwrap(), 20.0);
//! assert!(params.float("nope").is_err());
//! ```

use crate::error::{Result, ReverbError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Parameter keys
pub mod ids {
    /// Filter slots in pipeline order: low-shelf, peak, peak, high-shelf
    pub const FILTER_SLOTS: [&str; 4] = ["filter00", "filter01", "filter02", "filter03"];

    pub const FREQ_SUFFIX: &str = "_freq";
    pub const Q_SUFFIX: &str = "_Q";
    pub const GAIN_SUFFIX: &str = "_gain";
    pub const ENABLED_SUFFIX: &str = "_on";

    /// Linear gain applied to the IR after resampling
    pub const IR_GAIN: &str = "ir_gain";
    /// Pre-delay in milliseconds
    pub const PREDELAY: &str = "predelay";
    /// Dry/wet ratio in [0, 1]
    pub const WET_RATIO: &str = "wet_ratio";
    /// Linear output gain
    pub const OUT_GAIN: &str = "out_gain";
    /// Name of the selected impulse response
    pub const IR_CHOICE: &str = "ir_choice";

    /// Build a stage-scoped key, e.g. `filter00` + `_freq`
    pub fn key(block_id: &str, suffix: &str) -> String {
        format!("{block_id}{suffix}")
    }
}

/// Fixed limits shared by the stages and the registry
pub mod limits {
    /// Highest filter frequency in Hz
    pub const FILTER_FREQ_MAX: f32 = 20_000.0;
    pub const FILTER_Q_MIN: f32 = 0.7;
    pub const FILTER_Q_MAX: f32 = 10_000.0;
    pub const FILTER_GAIN_MIN_DB: f32 = -15.0;
    pub const FILTER_GAIN_MAX_DB: f32 = 15.0;
    /// Longest accepted pre-delay
    pub const PREDELAY_MAX_MS: f32 = 1_000.0;
    /// Ceiling for `ir_gain` and `out_gain`, the +15 dB amplitude factor
    pub const MAX_LINEAR_GAIN: f32 = 5.623_413;
    /// Default corner/center frequency of every filter slot
    pub const FILTER_FREQ_DEFAULT: f32 = 1_000.0;
    pub const FILTER_Q_DEFAULT: f32 = 0.707;
}

/// Convert decibels (amplitude) to a linear factor
pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert a linear factor to decibels (amplitude)
pub fn gain_to_db(gain: f32) -> f32 {
    20.0 * gain.max(f32::MIN_POSITIVE).log10()
}

/// A single parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    /// Continuous value
    Float(f32),
    /// Named choice (e.g. the selected IR)
    Choice(String),
}

/// Keyed parameter lookup used by every stage's `update_params`
pub trait ParameterSource {
    /// Raw lookup
    fn lookup(&self, key: &str) -> Option<&ParamValue>;

    /// Read a finite float parameter
    fn float(&self, key: &str) -> Result<f32> {
        match self.lookup(key) {
            Some(ParamValue::Float(value)) if value.is_finite() => Ok(*value),
            Some(ParamValue::Float(value)) => Err(ReverbError::NonFiniteParameter {
                key: key.to_string(),
                value: *value,
            }),
            Some(ParamValue::Choice(_)) => Err(ReverbError::WrongParameterKind {
                key: key.to_string(),
                expected: "float",
            }),
            None => Err(ReverbError::ParameterNotFound(key.to_string())),
        }
    }

    /// Read a choice parameter
    fn choice(&self, key: &str) -> Result<&str> {
        match self.lookup(key) {
            Some(ParamValue::Choice(value)) => Ok(value.as_str()),
            Some(ParamValue::Float(_)) => Err(ReverbError::WrongParameterKind {
                key: key.to_string(),
                expected: "choice",
            }),
            None => Err(ReverbError::ParameterNotFound(key.to_string())),
        }
    }

    /// Read a float parameter as an on/off flag (>= 0.5 is on)
    fn flag(&self, key: &str) -> Result<bool> {
        self.float(key).map(|value| value >= 0.5)
    }
}

impl ParameterSource for HashMap<String, ParamValue> {
    fn lookup(&self, key: &str) -> Option<&ParamValue> {
        self.get(key)
    }
}

/// Owned copy of every parameter value at one instant
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSnapshot {
    values: HashMap<String, ParamValue>,
}

impl ParameterSnapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot holding every registered parameter at its default
    ///
    /// The IR choice starts empty, meaning "no IR selected".
    pub fn defaults() -> Self {
        let mut snapshot = Self::new();
        for spec in parameter_specs() {
            snapshot.set_float(&spec.id, spec.default);
        }
        snapshot.set_choice(ids::IR_CHOICE, "");
        snapshot
    }

    /// Set a float value
    pub fn set_float(&mut self, key: &str, value: f32) {
        self.values
            .insert(key.to_string(), ParamValue::Float(value));
    }

    /// Set a choice value
    pub fn set_choice(&mut self, key: &str, value: &str) {
        self.values
            .insert(key.to_string(), ParamValue::Choice(value.to_string()));
    }

    /// Builder-style float setter
    #[must_use]
    pub fn with_float(mut self, key: &str, value: f32) -> Self {
        self.set_float(key, value);
        self
    }

    /// Builder-style choice setter
    #[must_use]
    pub fn with_choice(mut self, key: &str, value: &str) -> Self {
        self.set_choice(key, value);
        self
    }

    /// Remove a key
    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.values.remove(key)
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when no keys are set
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ParameterSource for ParameterSnapshot {
    fn lookup(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }
}

/// Registry entry for a float parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Key used in the parameter source
    pub id: String,
    /// Human readable name
    pub name: String,
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

impl ParameterSpec {
    fn new(id: String, name: String, min: f32, max: f32, default: f32) -> Self {
        Self {
            id,
            name,
            min,
            max,
            default,
        }
    }

    /// Whether `value` lies within `[min, max]`
    pub fn contains(&self, value: f32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// Every float parameter the engine reads, with ranges and defaults
pub fn parameter_specs() -> Vec<ParameterSpec> {
    const FILTER_NAMES: [&str; 4] = ["Low shelf", "Peak 1", "Peak 2", "High shelf"];

    let gain_min = db_to_gain(limits::FILTER_GAIN_MIN_DB);
    let gain_max = db_to_gain(limits::FILTER_GAIN_MAX_DB);

    let mut specs = Vec::with_capacity(ids::FILTER_SLOTS.len() * 4 + 4);
    for (slot, block) in ids::FILTER_SLOTS.iter().enumerate() {
        let name = FILTER_NAMES[slot];
        specs.push(ParameterSpec::new(
            ids::key(block, ids::FREQ_SUFFIX),
            format!("{name} frequency"),
            20.0,
            limits::FILTER_FREQ_MAX,
            limits::FILTER_FREQ_DEFAULT,
        ));
        specs.push(ParameterSpec::new(
            ids::key(block, ids::Q_SUFFIX),
            format!("{name} Q"),
            limits::FILTER_Q_MIN,
            limits::FILTER_Q_MAX,
            limits::FILTER_Q_DEFAULT,
        ));
        specs.push(ParameterSpec::new(
            ids::key(block, ids::GAIN_SUFFIX),
            format!("{name} gain"),
            gain_min,
            gain_max,
            1.0,
        ));
        specs.push(ParameterSpec::new(
            ids::key(block, ids::ENABLED_SUFFIX),
            format!("{name} enabled"),
            0.0,
            1.0,
            1.0,
        ));
    }

    specs.push(ParameterSpec::new(
        ids::IR_GAIN.to_string(),
        "IR gain".to_string(),
        0.0,
        limits::MAX_LINEAR_GAIN,
        1.0,
    ));
    specs.push(ParameterSpec::new(
        ids::PREDELAY.to_string(),
        "Pre-delay (ms)".to_string(),
        0.0,
        limits::PREDELAY_MAX_MS,
        0.0,
    ));
    specs.push(ParameterSpec::new(
        ids::WET_RATIO.to_string(),
        "Dry/wet".to_string(),
        0.0,
        1.0,
        0.5,
    ));
    specs.push(ParameterSpec::new(
        ids::OUT_GAIN.to_string(),
        "Output gain".to_string(),
        0.0,
        limits::MAX_LINEAR_GAIN,
        1.0,
    ));
    specs
}
