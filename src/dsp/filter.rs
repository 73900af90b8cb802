//! State-variable filter: topology-preserving transform (TPT) SVF with
//! switchable lowpass / bandpass / highpass output.

use std::f64::consts::PI;

use super::eq::map_range;

/// Cutoff range in Hz after mapping and modulation.
pub const CUTOFF_RANGE: (f32, f32) = (20.0, 20000.0);
/// Q range mapped from the 0..100 resonance control.
pub const Q_RANGE: (f32, f32) = (0.5, 10.0);
/// Cutoff swing in Hz per unit of LFO output per unit of depth.
pub const LFO_CUTOFF_SPAN_HZ: f32 = 1000.0;

/// Filter output tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Lowpass,
    Bandpass,
    Highpass,
}

impl FilterMode {
    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            0 => Some(FilterMode::Lowpass),
            1 => Some(FilterMode::Bandpass),
            2 => Some(FilterMode::Highpass),
            _ => None,
        }
    }
}

/// 0..100 cutoff control to Hz. Linear: the control's skew lives in its
/// parameter spec.
pub fn cutoff_hz(control: f32) -> f32 {
    map_range(control.clamp(0.0, 100.0), 0.0, 100.0, CUTOFF_RANGE.0, CUTOFF_RANGE.1)
}

/// 0..100 resonance control to Q.
pub fn resonance_q(control: f32) -> f32 {
    Q_RANGE.0 + (Q_RANGE.1 - Q_RANGE.0) * control.clamp(0.0, 100.0) / 100.0
}

/// Offset `base_hz` by `lfo * depth * LFO_CUTOFF_SPAN_HZ` (`depth` is the
/// raw 0..100 control) and clamp to the cutoff range.
pub fn modulated_cutoff(base_hz: f32, lfo: f32, depth: f32) -> f32 {
    let hz = base_hz + lfo * depth * LFO_CUTOFF_SPAN_HZ;
    hz.clamp(CUTOFF_RANGE.0, CUTOFF_RANGE.1)
}

/// Multichannel TPT state-variable filter.
///
/// Coefficients are shared across channels; each channel keeps two
/// integrator states. Cutoff is additionally held below Nyquist so the
/// prewarp never diverges at low sample rates.
#[derive(Debug, Clone)]
pub struct StateVariableFilter {
    pub mode: FilterMode,
    pub cutoff: f64,
    pub q: f64,

    g: f64,
    r2: f64,
    h: f64,

    s1: Vec<f64>,
    s2: Vec<f64>,

    sample_rate: f64,
}

impl StateVariableFilter {
    pub fn new(mode: FilterMode, num_channels: usize, sample_rate: f64) -> Self {
        let mut f = StateVariableFilter {
            mode,
            cutoff: 1000.0,
            q: std::f64::consts::FRAC_1_SQRT_2,
            g: 0.0,
            r2: 0.0,
            h: 0.0,
            s1: vec![0.0; num_channels],
            s2: vec![0.0; num_channels],
            sample_rate,
        };
        f.update_coefficients();
        f
    }

    /// Recompute `g`, `R2` and `h` from cutoff and Q.
    pub fn update_coefficients(&mut self) {
        let nyquist_guard = self.sample_rate * 0.49;
        let max_hz = (CUTOFF_RANGE.1 as f64).min(nyquist_guard);
        let fc = self.cutoff.clamp(CUTOFF_RANGE.0 as f64, max_hz);
        self.g = (PI * fc / self.sample_rate).tan();
        self.r2 = 1.0 / self.q.max(f64::EPSILON);
        self.h = 1.0 / (1.0 + self.r2 * self.g + self.g * self.g);
    }

    /// Switch topology by control index. Unknown indices leave the current
    /// mode in place.
    pub fn set_mode_index(&mut self, index: i32) {
        if let Some(mode) = FilterMode::from_index(index) {
            self.mode = mode;
        }
    }

    pub fn set_params(&mut self, cutoff_hz: f32, q: f32) {
        self.cutoff = cutoff_hz as f64;
        self.q = q as f64;
        self.update_coefficients();
    }

    /// Filter one sample of `channel`.
    #[inline]
    pub fn process(&mut self, input: f32, channel: usize) -> f32 {
        let x = input as f64;
        let s1 = self.s1[channel];
        let s2 = self.s2[channel];

        let hp = self.h * (x - s1 * (self.g + self.r2) - s2);
        let bp = hp * self.g + s1;
        let lp = bp * self.g + s2;

        self.s1[channel] = hp * self.g + bp;
        self.s2[channel] = bp * self.g + lp;

        let y = match self.mode {
            FilterMode::Lowpass => lp,
            FilterMode::Bandpass => bp,
            FilterMode::Highpass => hp,
        };
        y as f32
    }

    /// Filter a channel-major block in place.
    pub fn process_block(&mut self, data: &mut [f32], num_channels: usize, num_frames: usize) {
        let channels = num_channels.min(self.s1.len());
        for ch in 0..channels {
            for x in data[ch * num_frames..(ch + 1) * num_frames].iter_mut() {
                *x = self.process(*x, ch);
            }
        }
    }

    /// Reset integrator state.
    pub fn reset(&mut self) {
        self.s1.fill(0.0);
        self.s2.fill(0.0);
    }

    /// Zero the state if any integrator has gone non-finite. Returns whether
    /// a flush happened.
    pub fn flush_non_finite(&mut self) -> bool {
        let bad = self.s1.iter().chain(self.s2.iter()).any(|s| !s.is_finite());
        if bad {
            self.reset();
        }
        bad
    }
}
