//! Granular pitch shifter: per-channel circular history read back at a
//! pitch-scaled offset, windowed and blended half-and-half with the dry
//! signal.
//!
//! This is a coarse time-domain resampler. Extreme ratios modulate audibly.

use std::f32::consts::PI;

use super::smoothing::SmoothedValue;

/// Totals below this many semitones bypass the stage entirely.
pub const PASS_THROUGH_SEMITONES: f32 = 0.1;
/// Ramp time of the pitch-ratio smoother.
pub const PITCH_SMOOTHING_SECONDS: f64 = 0.05;

/// `semitones + 12 * octaves`.
#[inline]
pub fn total_semitones(semitones: f32, octaves: f32) -> f32 {
    semitones + octaves * 12.0
}

/// Playback-rate ratio for a shift in semitones.
#[inline]
pub fn pitch_ratio(semitones: f32) -> f32 {
    2.0_f32.powf(semitones / 12.0)
}

#[derive(Debug, Clone)]
struct PitchChannel {
    buffer: Vec<f32>,
    write_index: usize,
    ratio: SmoothedValue,
}

impl PitchChannel {
    fn new(buffer_len: usize) -> Self {
        Self {
            buffer: vec![0.0; buffer_len.max(2)],
            write_index: 0,
            ratio: SmoothedValue::new(1.0),
        }
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_index = 0;
        self.ratio.set_current_and_target(1.0);
    }

    /// Linear interpolation at a fractional position, wrapped into the buffer.
    #[inline]
    fn read_interpolated(&self, pos: f32) -> f32 {
        let len = self.buffer.len();
        let pos = pos.rem_euclid(len as f32);
        let idx = (pos as usize).min(len - 1);
        let frac = pos - idx as f32;
        let next = (idx + 1) % len;
        self.buffer[idx] * (1.0 - frac) + self.buffer[next] * frac
    }
}

#[derive(Debug, Clone)]
pub struct PitchShifter {
    channels: Vec<PitchChannel>,
    grain_size: usize,
}

impl PitchShifter {
    pub fn new(num_channels: usize, buffer_len: usize, grain_size: usize) -> Self {
        let buffer_len = buffer_len.max(2);
        Self {
            channels: (0..num_channels).map(|_| PitchChannel::new(buffer_len)).collect(),
            grain_size: grain_size.clamp(1, buffer_len - 1),
        }
    }

    /// Configure the ratio smoothers for `sample_rate`.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        for ch in self.channels.iter_mut() {
            ch.ratio.reset(sample_rate, PITCH_SMOOTHING_SECONDS);
        }
    }

    pub fn grain_size(&self) -> usize {
        self.grain_size
    }

    /// Current (smoothed) ratio of `channel`.
    pub fn ratio(&self, channel: usize) -> f32 {
        self.channels[channel].ratio.current()
    }

    /// Shift a channel-major block in place. A total shift under
    /// `PASS_THROUGH_SEMITONES` leaves the block and all state untouched.
    ///
    /// Reads only happen while the write index is past one grain, so the
    /// first grain after every wrap of the history stays dry. The window is
    /// keyed to the frame's position inside the block.
    pub fn process_block(
        &mut self,
        data: &mut [f32],
        num_channels: usize,
        num_frames: usize,
        semitones: f32,
        octaves: f32,
    ) {
        let total = total_semitones(semitones, octaves);
        if total.abs() < PASS_THROUGH_SEMITONES {
            return;
        }
        let target = pitch_ratio(total);
        let grain = self.grain_size;
        let grain_f = grain as f32;

        let channels = num_channels.min(self.channels.len());
        for (ch, state) in self.channels.iter_mut().enumerate().take(channels) {
            state.ratio.set_target(target);
            let len = state.buffer.len();

            let samples = &mut data[ch * num_frames..(ch + 1) * num_frames];
            for (frame, x) in samples.iter_mut().enumerate() {
                let ratio = state.ratio.next().max(f32::EPSILON);
                let w = state.write_index;
                state.buffer[w] = if x.is_finite() { *x } else { 0.0 };

                if w > grain {
                    let read_pos = w as f32 - grain_f / ratio;
                    let shifted = state.read_interpolated(read_pos);
                    let window = 0.5 + 0.5 * (PI * (frame % grain) as f32 / grain_f).cos();
                    *x = shifted * window * 0.5 + *x * 0.5;
                }

                state.write_index = (w + 1) % len;
            }
        }
    }

    /// Zero every history buffer and snap the ratios back to unity.
    pub fn reset(&mut self) {
        for ch in self.channels.iter_mut() {
            ch.clear();
        }
    }
}
