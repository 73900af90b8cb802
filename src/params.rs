//! Parameter store: one lock-free slot per control.
//!
//! The control thread writes, the audio thread reads a fresh copy of every
//! slot at the top of each block. Each parameter lives in its own atomic, so
//! a block may observe a mix of old and new values; controls are continuous
//! and slowly varying, so that is fine.

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;

use atomic_float::AtomicF32;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Current persisted-state format version.
pub const STATE_VERSION: u32 = 1;

/// Every control the engine reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamId {
    DelayTime,
    Feedback,
    Mix,
    GrainSize,
    GrainDensity,
    GrainSpray,
    ReverseGrains,
    Randomization,
    StereoWidth,
    EqHigh,
    EqLow,
    FilterCutoff,
    FilterResonance,
    FilterMode,
    PitchSemitones,
    PitchOctaves,
    PanPosition,
    LfoRate,
    LfoDepth,
    LfoTarget,
    LfoBipolar,
    LfoWaveform,
    LfoTempoSync,
    LfoSyncDivision,
    ChorusRate,
    ChorusDepth,
    ChorusMix,
    FlangerDelay,
    FlangerFeedback,
    FlangerDepth,
    FlangerRate,
    FlangerMix,
}

/// Number of parameters.
pub const PARAM_COUNT: usize = 32;

/// How a parameter's value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParamKind {
    /// Continuous value.
    Float,
    /// On when the value is above 0.5.
    Toggle,
    /// Integer index in `0..options`.
    Choice { options: u8 },
}

/// Declared range, skew and default for one parameter.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ParamSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub min: f32,
    pub max: f32,
    /// Skew factor; values below 1 give more of the normalized range to the
    /// low end.
    pub skew: f32,
    pub default: f32,
    pub kind: ParamKind,
}

const fn float(
    id: &'static str,
    name: &'static str,
    min: f32,
    max: f32,
    skew: f32,
    default: f32,
) -> ParamSpec {
    ParamSpec {
        id,
        name,
        min,
        max,
        skew,
        default,
        kind: ParamKind::Float,
    }
}

const fn toggle(id: &'static str, name: &'static str, default: bool) -> ParamSpec {
    ParamSpec {
        id,
        name,
        min: 0.0,
        max: 1.0,
        skew: 1.0,
        default: if default { 1.0 } else { 0.0 },
        kind: ParamKind::Toggle,
    }
}

const fn choice(id: &'static str, name: &'static str, options: u8, default: u8) -> ParamSpec {
    ParamSpec {
        id,
        name,
        min: 0.0,
        max: (options - 1) as f32,
        skew: 1.0,
        default: default as f32,
        kind: ParamKind::Choice { options },
    }
}

/// Spec table, indexed by `ParamId as usize`.
static SPECS: [ParamSpec; PARAM_COUNT] = [
    float("delayTime", "Delay Time (ms)", 1.0, 2000.0, 0.35, 400.0),
    float("feedback", "Feedback", 0.0, 0.95, 0.5, 0.35),
    float("mix", "Mix (%)", 0.0, 100.0, 0.5, 35.0),
    float("grainSize", "Grain Size (ms)", 5.0, 200.0, 0.5, 60.0),
    float("grainDensity", "Grain Density", 0.1, 4.0, 0.5, 1.0),
    float("grainSpray", "Grain Spray (%)", 0.0, 100.0, 0.5, 10.0),
    toggle("reverseGrains", "Reverse Grains", false),
    float("randomization", "Randomization (%)", 0.0, 100.0, 0.5, 15.0),
    float("stereoWidth", "Stereo Width (%)", 0.0, 100.0, 0.5, 50.0),
    float("eqHigh", "High Cut", 0.0, 100.0, 1.0, 80.0),
    float("eqLow", "Low Cut", 0.0, 100.0, 1.0, 10.0),
    float("filterCutoff", "Filter Cutoff", 0.0, 100.0, 0.3, 70.0),
    float("filterResonance", "Filter Resonance", 0.0, 100.0, 0.5, 10.0),
    choice("filterMode", "Filter Mode", 3, 0),
    float("pitchSemitones", "Pitch Semitones", -12.0, 12.0, 1.0, 0.0),
    float("pitchOctaves", "Pitch Octaves", -2.0, 2.0, 1.0, 0.0),
    float("panPosition", "Pan Position", -100.0, 100.0, 1.0, 0.0),
    float("lfoRate", "LFO Rate", 0.0, 100.0, 0.5, 25.0),
    float("lfoDepth", "LFO Depth", 0.0, 100.0, 0.5, 0.0),
    choice("lfoTarget", "LFO Target", 2, 0),
    toggle("lfoBipolar", "LFO Bipolar", true),
    choice("lfoWaveform", "LFO Waveform", 2, 0),
    toggle("lfoTempoSync", "LFO Tempo Sync", false),
    choice("lfoSyncDivision", "LFO Sync Division", 3, 2),
    float("chorusRate", "Chorus Rate", 0.0, 100.0, 0.5, 50.0),
    float("chorusDepth", "Chorus Depth", 0.0, 100.0, 0.5, 30.0),
    float("chorusMix", "Chorus Mix", 0.0, 100.0, 0.5, 0.0),
    float("flangerDelay", "Flanger Delay", 0.0, 100.0, 0.5, 25.0),
    float("flangerFeedback", "Flanger Feedback", 0.0, 95.0, 0.5, 40.0),
    float("flangerDepth", "Flanger Depth", 0.0, 100.0, 0.5, 60.0),
    float("flangerRate", "Flanger Rate", 0.0, 100.0, 0.5, 30.0),
    float("flangerMix", "Flanger Mix", 0.0, 100.0, 0.5, 0.0),
];

impl ParamId {
    pub const ALL: [ParamId; PARAM_COUNT] = [
        ParamId::DelayTime,
        ParamId::Feedback,
        ParamId::Mix,
        ParamId::GrainSize,
        ParamId::GrainDensity,
        ParamId::GrainSpray,
        ParamId::ReverseGrains,
        ParamId::Randomization,
        ParamId::StereoWidth,
        ParamId::EqHigh,
        ParamId::EqLow,
        ParamId::FilterCutoff,
        ParamId::FilterResonance,
        ParamId::FilterMode,
        ParamId::PitchSemitones,
        ParamId::PitchOctaves,
        ParamId::PanPosition,
        ParamId::LfoRate,
        ParamId::LfoDepth,
        ParamId::LfoTarget,
        ParamId::LfoBipolar,
        ParamId::LfoWaveform,
        ParamId::LfoTempoSync,
        ParamId::LfoSyncDivision,
        ParamId::ChorusRate,
        ParamId::ChorusDepth,
        ParamId::ChorusMix,
        ParamId::FlangerDelay,
        ParamId::FlangerFeedback,
        ParamId::FlangerDepth,
        ParamId::FlangerRate,
        ParamId::FlangerMix,
    ];

    #[inline]
    pub fn spec(self) -> &'static ParamSpec {
        &SPECS[self as usize]
    }

    /// The string identifier used by hosts and persisted state.
    pub fn as_str(self) -> &'static str {
        self.spec().id
    }

    pub fn from_id(id: &str) -> Option<ParamId> {
        Self::ALL.iter().copied().find(|p| p.as_str() == id)
    }
}

/// All parameter specs in declaration order.
pub fn specs() -> &'static [ParamSpec] {
    &SPECS
}

impl ParamSpec {
    /// Clamp a raw value into range. Choices snap to the nearest index,
    /// non-finite input falls back to the default.
    pub fn clamp(&self, value: f32) -> f32 {
        if !value.is_finite() {
            return self.default;
        }
        let v = value.clamp(self.min, self.max);
        match self.kind {
            ParamKind::Float => v,
            ParamKind::Toggle => {
                if v > 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            ParamKind::Choice { .. } => v.round(),
        }
    }

    /// Map a value into `[0, 1]` following the skewed range law.
    pub fn to_normalized(&self, value: f32) -> f32 {
        let span = self.max - self.min;
        if span <= 0.0 {
            return 0.0;
        }
        let p = ((self.clamp(value) - self.min) / span).clamp(0.0, 1.0);
        if self.skew == 1.0 { p } else { p.powf(self.skew) }
    }

    /// Inverse of `to_normalized`.
    pub fn from_normalized(&self, normalized: f32) -> f32 {
        let p = normalized.clamp(0.0, 1.0);
        let p = if self.skew == 1.0 { p } else { p.powf(1.0 / self.skew) };
        self.clamp(self.min + (self.max - self.min) * p)
    }
}

/// Serializable copy of every parameter, keyed by string identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSnapshot {
    pub version: u32,
    pub params: BTreeMap<String, f32>,
}

/// Shared parameter storage. Wrap in an `Arc` and hand one clone to the
/// processor and one to the control side.
#[derive(Debug)]
pub struct ParamStore {
    values: [AtomicF32; PARAM_COUNT],
}

impl Default for ParamStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamStore {
    pub fn new() -> Self {
        Self {
            values: std::array::from_fn(|i| AtomicF32::new(SPECS[i].default)),
        }
    }

    #[inline]
    pub fn get(&self, id: ParamId) -> f32 {
        self.values[id as usize].load(Ordering::Relaxed)
    }

    #[inline]
    pub fn get_bool(&self, id: ParamId) -> bool {
        self.get(id) > 0.5
    }

    #[inline]
    pub fn get_index(&self, id: ParamId) -> i32 {
        self.get(id).round() as i32
    }

    /// Store a value, clamped into the parameter's declared range.
    pub fn set(&self, id: ParamId, value: f32) {
        self.values[id as usize].store(id.spec().clamp(value), Ordering::Relaxed);
    }

    /// Store from a normalized `[0, 1]` host value.
    pub fn set_normalized(&self, id: ParamId, normalized: f32) {
        self.set(id, id.spec().from_normalized(normalized));
    }

    pub fn get_by_name(&self, id: &str) -> Result<f32, EngineError> {
        let p = ParamId::from_id(id).ok_or_else(|| EngineError::UnknownParameter(id.to_string()))?;
        Ok(self.get(p))
    }

    pub fn set_by_name(&self, id: &str, value: f32) -> Result<(), EngineError> {
        let p = ParamId::from_id(id).ok_or_else(|| EngineError::UnknownParameter(id.to_string()))?;
        self.set(p, value);
        Ok(())
    }

    pub fn reset_to_defaults(&self) {
        for id in ParamId::ALL {
            self.set(id, id.spec().default);
        }
    }

    pub fn snapshot(&self) -> ParamSnapshot {
        ParamSnapshot {
            version: STATE_VERSION,
            params: ParamId::ALL
                .iter()
                .map(|&id| (id.as_str().to_string(), self.get(id)))
                .collect(),
        }
    }

    /// Apply a snapshot. Unknown ids are ignored, missing ids keep their
    /// current value.
    pub fn apply_snapshot(&self, snapshot: &ParamSnapshot) {
        for (key, &value) in &snapshot.params {
            if let Some(id) = ParamId::from_id(key) {
                self.set(id, value);
            }
        }
    }

    /// Serialize the full parameter set into an opaque state blob.
    pub fn save_state(&self) -> Result<Vec<u8>, EngineError> {
        let bytes = serde_json::to_vec(&self.snapshot())?;
        log::debug!("saved parameter state ({} bytes)", bytes.len());
        Ok(bytes)
    }

    /// Restore from a blob produced by `save_state`. On error nothing is
    /// modified.
    pub fn load_state(&self, bytes: &[u8]) -> Result<(), EngineError> {
        let snapshot: ParamSnapshot = serde_json::from_slice(bytes)?;
        if snapshot.version != STATE_VERSION {
            return Err(EngineError::StateVersion(snapshot.version));
        }
        self.apply_snapshot(&snapshot);
        Ok(())
    }
}
