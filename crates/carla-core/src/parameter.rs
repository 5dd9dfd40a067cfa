//! Parameter ranges and the per-plugin parameter record (§3).

use serde::{Deserialize, Serialize};

use crate::lockfree::AtomicFloat;

/// How a parameter's normalized `[0,1]` representation (used for MIDI CC and
/// automation) maps onto its actual `[min,max]` range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParameterScale {
    Linear,
    Logarithmic,
    Exponential { curve: f32 },
    Toggle,
    Integer,
}

impl Default for ParameterScale {
    fn default() -> Self {
        ParameterScale::Linear
    }
}

/// `{min, max, def, step, step_small, step_large}` from §3.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterRanges {
    pub min: f32,
    pub max: f32,
    pub def: f32,
    pub step: f32,
    pub step_small: f32,
    pub step_large: f32,
    pub scale: ParameterScale,
}

impl ParameterRanges {
    pub fn new(min: f32, max: f32, def: f32) -> Self {
        let step = ((max - min) / 100.0).max(f32::EPSILON);
        Self {
            min,
            max,
            def: def.clamp(min, max),
            step,
            step_small: step / 10.0,
            step_large: step * 10.0,
            scale: ParameterScale::Linear,
        }
    }

    pub fn toggle(def: bool) -> Self {
        Self {
            min: 0.0,
            max: 1.0,
            def: if def { 1.0 } else { 0.0 },
            step: 1.0,
            step_small: 1.0,
            step_large: 1.0,
            scale: ParameterScale::Toggle,
        }
    }

    pub fn with_scale(mut self, scale: ParameterScale) -> Self {
        self.scale = scale;
        self
    }

    /// Invariant from §3: the post-process observed value is always clamped
    /// into `[min, max]`.
    pub fn clamp(&self, value: f32) -> f32 {
        let value = value.clamp(self.min, self.max);
        match self.scale {
            ParameterScale::Toggle => {
                if value >= (self.min + self.max) / 2.0 {
                    self.max
                } else {
                    self.min
                }
            }
            ParameterScale::Integer => value.round().clamp(self.min, self.max),
            _ => value,
        }
    }

    pub fn span(&self) -> f32 {
        self.max - self.min
    }

    /// Maps `value` (in `[min,max]`) to `[0,1]` for MIDI CC / automation.
    pub fn normalize(&self, value: f32) -> f32 {
        let value = self.clamp(value);
        if self.span() <= 0.0 {
            return 0.0;
        }
        match self.scale {
            ParameterScale::Logarithmic => {
                let min = self.min.max(f32::EPSILON);
                let max = self.max.max(min + f32::EPSILON);
                let value = value.max(min);
                (value / min).ln() / (max / min).ln()
            }
            ParameterScale::Exponential { curve } => {
                let linear = (value - self.min) / self.span();
                linear.powf(1.0 / curve.max(f32::EPSILON))
            }
            _ => (value - self.min) / self.span(),
        }
        .clamp(0.0, 1.0)
    }

    /// Inverse of [`Self::normalize`].
    pub fn denormalize(&self, normalized: f32) -> f32 {
        let normalized = normalized.clamp(0.0, 1.0);
        let value = match self.scale {
            ParameterScale::Logarithmic => {
                let min = self.min.max(f32::EPSILON);
                let max = self.max.max(min + f32::EPSILON);
                min * (max / min).powf(normalized)
            }
            ParameterScale::Exponential { curve } => {
                self.min + normalized.powf(curve.max(f32::EPSILON)) * self.span()
            }
            _ => self.min + normalized * self.span(),
        };
        self.clamp(value)
    }
}

/// `{type, key, value}` plugin-private persistent state (§3, and
/// `CustomData` in `carla_plugin_internal.hpp`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomData {
    pub ty: String,
    pub key: String,
    pub value: String,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ParameterFlags: u32 {
        const IS_ENABLED      = 1 << 0;
        const IS_AUTOMATABLE  = 1 << 1;
        const IS_READ_ONLY    = 1 << 2;
        const USES_SAMPLE_RATE = 1 << 3;
    }
}

/// A single plugin parameter (§3).
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub unit: String,
    pub flags: ParameterFlags,
    pub ranges: ParameterRanges,
    /// RT-shared current value; written by the RT thread, read by control.
    pub current: AtomicFloat,
    pub default: f32,
    pub midi_cc: i16,
    pub midi_channel: i8,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ranges: ParameterRanges) -> Self {
        let def = ranges.def;
        Self {
            name: name.into(),
            unit: String::new(),
            flags: ParameterFlags::IS_ENABLED | ParameterFlags::IS_AUTOMATABLE,
            ranges,
            current: AtomicFloat::new(def),
            default: def,
            midi_cc: -1,
            midi_channel: -1,
        }
    }

    pub fn value(&self) -> f32 {
        self.current.get()
    }

    /// Sets the current value, clamping into range per the invariant in §8.
    pub fn set_value(&self, value: f32) -> f32 {
        let clamped = self.ranges.clamp(value);
        self.current.set(clamped);
        clamped
    }
}
