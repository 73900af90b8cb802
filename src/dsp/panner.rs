//! Equal-power panner: folds a stereo pair to mono and places it with a
//! cos/sin gain pair. One smoother drives both channels.

use std::f32::consts::FRAC_PI_4;

use super::smoothing::SmoothedValue;

/// Ramp time of the pan smoother.
pub const PAN_SMOOTHING_SECONDS: f64 = 0.05;
/// Pan control range, either side of centre.
pub const PAN_LIMIT: f32 = 100.0;

/// `(left, right)` gains for a pan position in `[-1, 1]`.
#[inline]
pub fn equal_power_gains(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
    (angle.cos(), angle.sin())
}

/// Pan control offset by the LFO (`lfo` in its own range, `depth` 0..100)
/// and clamped to the control range.
#[inline]
pub fn modulated_pan(pan: f32, lfo: f32, depth: f32) -> f32 {
    (pan + lfo * depth).clamp(-PAN_LIMIT, PAN_LIMIT)
}

#[derive(Debug, Clone)]
pub struct Panner {
    position: SmoothedValue,
}

impl Default for Panner {
    fn default() -> Self {
        Self::new()
    }
}

impl Panner {
    pub fn new() -> Self {
        Self {
            position: SmoothedValue::new(0.0),
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.position.reset(sample_rate, PAN_SMOOTHING_SECONDS);
    }

    /// Set the target from a -100..100 control value.
    pub fn set_target(&mut self, pan: f32) {
        self.position.set_target(pan.clamp(-PAN_LIMIT, PAN_LIMIT) / PAN_LIMIT);
    }

    /// Current smoothed position in `[-1, 1]`.
    pub fn position(&self) -> f32 {
        self.position.current()
    }

    /// Pan a channel-major stereo block in place. Anything other than two
    /// channels passes through untouched.
    pub fn process_block(&mut self, data: &mut [f32], num_channels: usize, num_frames: usize) {
        if num_channels != 2 {
            return;
        }
        let (left, right) = data[..2 * num_frames].split_at_mut(num_frames);
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let (gl, gr) = equal_power_gains(self.position.next());
            let mono = (*l + *r) * 0.5;
            *l = mono * gl;
            *r = mono * gr;
        }
    }

    /// Snap to centre.
    pub fn reset(&mut self) {
        self.position.set_current_and_target(0.0);
    }
}
