//! Low-frequency oscillator shared by the filter and panner stages.
//!
//! The phase advances once per block by `frequency * block_duration`, not per
//! sample, so every stage reading the LFO during a block sees the same value.

use std::f32::consts::PI;

/// Free-running rate range in Hz, mapped from the 0..100 rate control.
pub const RATE_RANGE: (f32, f32) = (0.1, 10.0);

/// LFO waveform shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LfoWaveform {
    Sine,
    Triangle,
}

impl LfoWaveform {
    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            0 => Some(LfoWaveform::Sine),
            1 => Some(LfoWaveform::Triangle),
            _ => None,
        }
    }
}

/// Which stage the LFO modulates. Each consuming stage checks this itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LfoTarget {
    Cutoff,
    Pan,
}

impl LfoTarget {
    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            0 => Some(LfoTarget::Cutoff),
            1 => Some(LfoTarget::Pan),
            _ => None,
        }
    }
}

/// Musical length of one LFO cycle when tempo-synced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDivision {
    Quarter,
    Half,
    Bar,
}

impl SyncDivision {
    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            0 => Some(SyncDivision::Quarter),
            1 => Some(SyncDivision::Half),
            2 => Some(SyncDivision::Bar),
            _ => None,
        }
    }

    /// Beats-per-second divisor for this division.
    pub fn divisor(self) -> f32 {
        match self {
            SyncDivision::Quarter => 4.0,
            SyncDivision::Half => 2.0,
            SyncDivision::Bar => 1.0,
        }
    }
}

/// Per-block LFO controls.
#[derive(Debug, Clone, Copy)]
pub struct LfoSettings {
    /// Free-running rate control, 0..100.
    pub rate: f32,
    pub tempo_sync: bool,
    pub division: SyncDivision,
    pub waveform: LfoWaveform,
    pub bipolar: bool,
}

/// Piecewise-linear triangle over one cycle, starting at 0 and rising.
#[inline]
pub fn triangle(phase: f32) -> f32 {
    let t = phase * 4.0;
    if t < 1.0 {
        t
    } else if t < 3.0 {
        2.0 - t
    } else {
        t - 4.0
    }
}

#[derive(Debug, Clone)]
pub struct Lfo {
    phase: f32,
    frequency: f32,
}

impl Default for Lfo {
    fn default() -> Self {
        Self::new()
    }
}

impl Lfo {
    pub fn new() -> Self {
        Lfo {
            phase: 0.0,
            frequency: 1.0,
        }
    }

    /// Cycle frequency for these settings: tempo-derived when synced and the
    /// host reports a tempo, otherwise the free-running rate.
    pub fn frequency_for(settings: &LfoSettings, bpm: Option<f64>) -> f32 {
        match bpm {
            Some(bpm) if settings.tempo_sync && bpm.is_finite() && bpm > 0.0 => {
                (bpm as f32 / 60.0) / settings.division.divisor()
            }
            _ => {
                let rate = settings.rate.clamp(0.0, 100.0);
                RATE_RANGE.0 + (RATE_RANGE.1 - RATE_RANGE.0) * rate / 100.0
            }
        }
    }

    /// Block-rate update: refresh the frequency and advance the phase by one
    /// block's worth, wrapped into `[0, 1)`.
    pub fn update(
        &mut self,
        settings: &LfoSettings,
        bpm: Option<f64>,
        block_frames: usize,
        sample_rate: f32,
    ) {
        self.frequency = Self::frequency_for(settings, bpm);
        let advance = self.frequency * block_frames as f32 / sample_rate;
        let phase = self.phase + advance;
        self.phase = phase - phase.floor();
        if !(0.0..1.0).contains(&self.phase) {
            self.phase = 0.0;
        }
    }

    /// Current output: `[-1, 1]` when bipolar, `[0, 1]` otherwise.
    pub fn value(&self, waveform: LfoWaveform, bipolar: bool) -> f32 {
        let v = match waveform {
            LfoWaveform::Sine => (2.0 * PI * self.phase).sin(),
            LfoWaveform::Triangle => triangle(self.phase),
        };
        if bipolar { v } else { (v + 1.0) * 0.5 }
    }

    #[inline]
    pub fn phase(&self) -> f32 {
        self.phase
    }

    #[inline]
    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    /// Reset phase to zero.
    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn free(rate: f32) -> LfoSettings {
        LfoSettings {
            rate,
            tempo_sync: false,
            division: SyncDivision::Bar,
            waveform: LfoWaveform::Sine,
            bipolar: true,
        }
    }

    #[test]
    fn rate_control_maps_to_hz() {
        assert!((Lfo::frequency_for(&free(0.0), None) - 0.1).abs() < 1e-6);
        assert!((Lfo::frequency_for(&free(100.0), None) - 10.0).abs() < 1e-5);
        assert!((Lfo::frequency_for(&free(50.0), None) - 5.05).abs() < 1e-5);
    }

    #[test]
    fn tempo_sync_uses_host_bpm() {
        let mut s = free(0.0);
        s.tempo_sync = true;
        s.division = SyncDivision::Quarter;
        assert!((Lfo::frequency_for(&s, Some(120.0)) - 0.5).abs() < 1e-6);
        s.division = SyncDivision::Half;
        assert!((Lfo::frequency_for(&s, Some(120.0)) - 1.0).abs() < 1e-6);
        s.division = SyncDivision::Bar;
        assert!((Lfo::frequency_for(&s, Some(120.0)) - 2.0).abs() < 1e-6);
        // no transport: free-running rate
        assert!((Lfo::frequency_for(&s, None) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn phase_advances_per_block() {
        let mut lfo = Lfo::new();
        // 1 Hz rate control value: (1 - 0.1) / 9.9 * 100
        let s = free((1.0 - 0.1) / 9.9 * 100.0);
        lfo.update(&s, None, 4800, 48000.0);
        assert!((lfo.phase() - 0.1).abs() < 1e-4, "phase {}", lfo.phase());
    }

    #[test]
    fn phase_stays_in_unit_interval() {
        let mut lfo = Lfo::new();
        let s = free(100.0);
        for block in [1, 7, 64, 512, 4096, 100_000] {
            for _ in 0..500 {
                lfo.update(&s, None, block, 44100.0);
                let p = lfo.phase();
                assert!((0.0..1.0).contains(&p), "phase {p} after block of {block}");
            }
        }
    }

    #[test]
    fn waveform_ranges() {
        let mut lfo = Lfo::new();
        let s = free(37.0);
        for _ in 0..2000 {
            lfo.update(&s, None, 97, 44100.0);
            for wf in [LfoWaveform::Sine, LfoWaveform::Triangle] {
                let b = lfo.value(wf, true);
                assert!((-1.0..=1.0).contains(&b), "{wf:?} bipolar {b}");
                let u = lfo.value(wf, false);
                assert!((0.0..=1.0).contains(&u), "{wf:?} unipolar {u}");
            }
        }
    }

    #[test]
    fn triangle_shape() {
        assert_eq!(triangle(0.0), 0.0);
        assert!((triangle(0.25) - 1.0).abs() < 1e-6);
        assert!((triangle(0.5) - 0.0).abs() < 1e-6);
        assert!((triangle(0.75) + 1.0).abs() < 1e-6);
        assert!(triangle(0.99) < 0.0);
    }

    #[test]
    fn unknown_indices_are_rejected() {
        assert_eq!(LfoWaveform::from_index(2), None);
        assert_eq!(LfoTarget::from_index(-1), None);
        assert_eq!(SyncDivision::from_index(3), None);
        assert_eq!(LfoTarget::from_index(1), Some(LfoTarget::Pan));
    }
}
