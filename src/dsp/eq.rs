//! Feedback EQ: two cascaded one-pole low-passes shaping the delayed signal.
//!
//! The first pole sets the high cut. A second low-pass at the low-cut
//! frequency runs on the first one's output and is subtracted from it, which
//! leaves a high-passed residual: together a gentle band-pass.

use std::f32::consts::PI;

/// Lowest / highest high-cut frequency in Hz.
pub const HIGH_CUT_RANGE: (f32, f32) = (200.0, 20000.0);
/// Lowest / highest low-cut frequency in Hz.
pub const LOW_CUT_RANGE: (f32, f32) = (10.0, 1000.0);

/// Linear map of `value` from `[in_lo, in_hi]` to `[out_lo, out_hi]`.
#[inline]
pub fn map_range(value: f32, in_lo: f32, in_hi: f32, out_lo: f32, out_hi: f32) -> f32 {
    out_lo + (out_hi - out_lo) * ((value - in_lo) / (in_hi - in_lo))
}

/// Decay coefficient of a one-pole low-pass at `freq` Hz.
#[inline]
pub fn one_pole_coeff(freq: f32, sample_rate: f32) -> f32 {
    (-2.0 * PI * freq / sample_rate).exp()
}

/// A first-order low-pass: `y = a*y + (1-a)*x`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnePole {
    state: f32,
}

impl OnePole {
    #[inline]
    pub fn tick(&mut self, x: f32, coeff: f32) -> f32 {
        self.state = coeff * self.state + (1.0 - coeff) * x;
        self.state
    }

    #[inline]
    pub fn state(&self) -> f32 {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = 0.0;
    }
}

/// Coefficients for one block, derived from the 0..100 EQ controls.
#[derive(Debug, Clone, Copy)]
pub struct EqCoeffs {
    pub high_cut_hz: f32,
    pub low_cut_hz: f32,
    high: f32,
    low: f32,
}

impl EqCoeffs {
    pub fn new(eq_high: f32, eq_low: f32, sample_rate: f32) -> Self {
        let (high_lo, high_hi) = HIGH_CUT_RANGE;
        let (low_lo, low_hi) = LOW_CUT_RANGE;
        let high_cut_hz = map_range(eq_high.clamp(0.0, 100.0), 0.0, 100.0, high_lo, high_hi);
        let low_cut_hz = map_range(eq_low.clamp(0.0, 100.0), 0.0, 100.0, low_lo, low_hi);
        Self {
            high_cut_hz,
            low_cut_hz,
            high: one_pole_coeff(high_cut_hz, sample_rate),
            low: one_pole_coeff(low_cut_hz, sample_rate),
        }
    }
}

/// Per-channel EQ state.
#[derive(Debug, Clone, Copy, Default)]
pub struct EqStage {
    high_cut: OnePole,
    low_cut: OnePole,
}

impl EqStage {
    #[inline]
    pub fn process(&mut self, sample: f32, coeffs: &EqCoeffs) -> f32 {
        let lp = self.high_cut.tick(sample, coeffs.high);
        let lower = self.low_cut.tick(lp, coeffs.low);
        lp - lower
    }

    pub fn reset(&mut self) {
        self.high_cut.reset();
        self.low_cut.reset();
    }
}
