//! Chorus and flanger: stereo modulated delay lines with feedback.
//!
//! Both run on the same `ModulatedDelay` core, differing only in delay
//! ranges and how their feedback is driven. A sine LFO per channel sweeps
//! the read tap; the right channel runs a quarter cycle ahead.

use std::f64::consts::PI;

use super::eq::map_range;
use super::mixer::dry_wet;
use super::smoothing::SmoothedValue;

/// Phase offset between L/R modulation, in cycles.
pub const STEREO_PHASE_OFFSET: f64 = 0.25;

pub const CHORUS_RATE_RANGE: (f32, f32) = (0.1, 5.0);
pub const CHORUS_CENTRE_MS: f64 = 5.0;
/// Peak sweep in ms at depth 1.0.
pub const CHORUS_SWEEP_MS: f64 = 10.0;
pub const CHORUS_MIN_DELAY_MS: f64 = 1.0;
pub const CHORUS_FEEDBACK: f32 = 0.3;

pub const FLANGER_CENTRE_RANGE_MS: (f32, f32) = (0.1, 10.0);
pub const FLANGER_DEPTH_RANGE_MS: (f32, f32) = (0.0, 5.0);
pub const FLANGER_RATE_RANGE: (f32, f32) = (0.1, 2.0);
pub const FLANGER_FEEDBACK_SMOOTHING_SECONDS: f64 = 0.02;

/// Shape of the swept delay for one block.
#[derive(Debug, Clone, Copy)]
pub struct Sweep {
    pub centre_ms: f64,
    pub sweep_ms: f64,
    pub min_ms: f64,
    pub rate_hz: f64,
}

/// Multichannel delay line read at an LFO-swept fractional tap.
#[derive(Debug, Clone)]
pub struct ModulatedDelay {
    buffers: Vec<Vec<f32>>,
    last_out: Vec<f32>,
    phases: Vec<f64>,
    write_pos: usize,
    sample_rate: f64,
}

impl ModulatedDelay {
    /// Allocate lines long enough for `max_delay` seconds.
    pub fn new(num_channels: usize, sample_rate: f64, max_delay: f64) -> Self {
        let buffer_size = ((sample_rate * max_delay) as usize + 1).max(4);
        Self {
            buffers: vec![vec![0.0; buffer_size]; num_channels],
            last_out: vec![0.0; num_channels],
            phases: Self::initial_phases(num_channels),
            write_pos: 0,
            sample_rate,
        }
    }

    fn initial_phases(num_channels: usize) -> Vec<f64> {
        (0..num_channels)
            .map(|ch| if ch == 1 { STEREO_PHASE_OFFSET } else { 0.0 })
            .collect()
    }

    pub fn num_channels(&self) -> usize {
        self.buffers.len()
    }

    /// Read from the delay buffer with fractional (linear interpolation) delay.
    #[inline]
    fn read_interpolated(buffer: &[f32], write_pos: usize, delay_samples: f64) -> f32 {
        let buffer_len = buffer.len();
        let delay_int = delay_samples as usize;
        let frac = (delay_samples - delay_int as f64) as f32;

        let read_pos_0 = if write_pos >= delay_int {
            write_pos - delay_int
        } else {
            buffer_len - (delay_int - write_pos)
        };

        let read_pos_1 = if read_pos_0 == 0 {
            buffer_len - 1
        } else {
            read_pos_0 - 1
        };

        let s0 = buffer[read_pos_0];
        let s1 = buffer[read_pos_1];

        s0 + frac * (s1 - s0)
    }

    /// Process frame `frame` of a channel-major block across `channels`.
    #[inline]
    pub fn process_frame(
        &mut self,
        data: &mut [f32],
        num_frames: usize,
        frame: usize,
        channels: usize,
        sweep: &Sweep,
        feedback: f32,
        mix: f32,
    ) {
        let max_delay = (self.buffers[0].len() - 1) as f64;
        let channels = channels.min(self.buffers.len());

        for ch in 0..channels {
            let lfo = (2.0 * PI * self.phases[ch]).sin();
            let delay_ms = (sweep.centre_ms + sweep.sweep_ms * lfo).max(sweep.min_ms);
            let delay = (delay_ms * self.sample_rate / 1000.0).clamp(1.0, max_delay);

            let idx = ch * num_frames + frame;
            let dry = data[idx];
            let write = dry + self.last_out[ch] * feedback;
            self.buffers[ch][self.write_pos] = if write.is_finite() { write } else { 0.0 };
            let wet = Self::read_interpolated(&self.buffers[ch], self.write_pos, delay);
            self.last_out[ch] = wet;
            data[idx] = dry_wet(dry, wet, mix);
        }

        self.write_pos = (self.write_pos + 1) % self.buffers[0].len();
        let phase_inc = sweep.rate_hz / self.sample_rate;
        for p in self.phases.iter_mut() {
            *p = (*p + phase_inc) % 1.0;
        }
    }

    /// Clear internal buffers.
    pub fn clear(&mut self) {
        for b in self.buffers.iter_mut() {
            b.fill(0.0);
        }
        self.last_out.fill(0.0);
        self.phases = Self::initial_phases(self.buffers.len());
        self.write_pos = 0;
    }
}

/// Chorus with fixed centre delay and feedback. Skipped entirely when the
/// mix is zero.
#[derive(Debug, Clone)]
pub struct Chorus {
    delay: ModulatedDelay,

    /// LFO rate in Hz.
    pub rate: f64,
    /// Modulation depth (0.0 to 1.0).
    pub depth: f64,
    /// Dry/wet mix (0.0 = fully dry, 1.0 = fully wet).
    pub mix: f32,
}

impl Chorus {
    pub fn new(num_channels: usize, sample_rate: f64, max_delay: f64) -> Self {
        Self {
            delay: ModulatedDelay::new(num_channels, sample_rate, max_delay),
            rate: 1.0,
            depth: 0.3,
            mix: 0.0,
        }
    }

    /// Apply the 0..100 rate / depth / mix controls.
    pub fn set_controls(&mut self, rate: f32, depth: f32, mix: f32) {
        let (lo, hi) = CHORUS_RATE_RANGE;
        self.rate = map_range(rate.clamp(0.0, 100.0), 0.0, 100.0, lo, hi) as f64;
        self.depth = (depth.clamp(0.0, 100.0) / 100.0) as f64;
        self.mix = mix.clamp(0.0, 100.0) / 100.0;
    }

    /// Process a channel-major block in place.
    pub fn process_block(&mut self, data: &mut [f32], num_channels: usize, num_frames: usize) {
        if self.mix <= 0.0 {
            return;
        }
        let sweep = Sweep {
            centre_ms: CHORUS_CENTRE_MS,
            sweep_ms: CHORUS_SWEEP_MS * self.depth,
            min_ms: CHORUS_MIN_DELAY_MS,
            rate_hz: self.rate,
        };
        for frame in 0..num_frames {
            self.delay.process_frame(
                data,
                num_frames,
                frame,
                num_channels,
                &sweep,
                CHORUS_FEEDBACK,
                self.mix,
            );
        }
    }

    pub fn clear(&mut self) {
        self.delay.clear();
    }
}

/// Flanger: short swept delay, feedback ramped by one smoother shared
/// across channels. Always processed; a zero mix leaves the signal dry.
#[derive(Debug, Clone)]
pub struct Flanger {
    delay: ModulatedDelay,
    feedback: SmoothedValue,

    /// Centre delay in ms.
    pub centre_ms: f64,
    /// Sweep depth in ms.
    pub depth_ms: f64,
    /// LFO rate in Hz.
    pub rate: f64,
    /// Dry/wet mix (0.0 = fully dry, 1.0 = fully wet).
    pub mix: f32,
}

impl Flanger {
    pub fn new(num_channels: usize, sample_rate: f64, max_delay: f64) -> Self {
        let mut feedback = SmoothedValue::new(0.0);
        feedback.reset(sample_rate, FLANGER_FEEDBACK_SMOOTHING_SECONDS);
        Self {
            delay: ModulatedDelay::new(num_channels, sample_rate, max_delay),
            feedback,
            centre_ms: 2.5,
            depth_ms: 3.0,
            rate: 0.67,
            mix: 0.0,
        }
    }

    /// Apply the 0..100 centre / depth / rate / mix controls and the 0..95
    /// feedback control (as a percentage).
    pub fn set_controls(&mut self, centre: f32, depth: f32, rate: f32, feedback: f32, mix: f32) {
        let c = centre.clamp(0.0, 100.0);
        let d = depth.clamp(0.0, 100.0);
        let r = rate.clamp(0.0, 100.0);
        let (c_lo, c_hi) = FLANGER_CENTRE_RANGE_MS;
        let (d_lo, d_hi) = FLANGER_DEPTH_RANGE_MS;
        self.centre_ms = map_range(c, 0.0, 100.0, c_lo, c_hi) as f64;
        self.depth_ms = map_range(d, 0.0, 100.0, d_lo, d_hi) as f64;
        self.rate = map_range(r, 0.0, 100.0, FLANGER_RATE_RANGE.0, FLANGER_RATE_RANGE.1) as f64;
        self.feedback.set_target(feedback.clamp(0.0, 95.0) / 100.0);
        self.mix = mix.clamp(0.0, 100.0) / 100.0;
    }

    /// Current smoothed feedback gain.
    pub fn feedback(&self) -> f32 {
        self.feedback.current()
    }

    /// Process a channel-major block in place.
    pub fn process_block(&mut self, data: &mut [f32], num_channels: usize, num_frames: usize) {
        let sweep = Sweep {
            centre_ms: self.centre_ms,
            sweep_ms: self.depth_ms,
            min_ms: 0.0,
            rate_hz: self.rate,
        };
        for frame in 0..num_frames {
            let fb = self.feedback.next();
            self.delay
                .process_frame(data, num_frames, frame, num_channels, &sweep, fb, self.mix);
        }
    }

    /// Clear the line and snap feedback to its target.
    pub fn clear(&mut self) {
        self.delay.clear();
        let target = self.feedback.target();
        self.feedback.set_current_and_target(target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frames: usize, channels: usize) -> Vec<f32> {
        (0..frames * channels)
            .map(|n| ((n % frames) as f32 * 0.07).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_chorus_passthrough_when_dry() {
        let mut chorus = Chorus::new(2, 44100.0, 0.05);
        chorus.set_controls(50.0, 30.0, 0.0);

        let input = sine(512, 2);
        let mut data = input.clone();
        chorus.process_block(&mut data, 2, 512);
        assert_eq!(data, input);
    }

    #[test]
    fn test_chorus_produces_modulated_output() {
        let mut chorus = Chorus::new(1, 44100.0, 0.05);
        chorus.set_controls(60.0, 100.0, 100.0);

        let mut data = vec![1.0; 4410];
        chorus.process_block(&mut data, 1, 4410);

        let later = &data[1000..];
        let min = later.iter().fold(f32::MAX, |m, &s| m.min(s));
        let max = later.iter().fold(f32::MIN, |m, &s| m.max(s));
        // constant input settles near 1 / (1 - feedback)
        let settled = 1.0 / (1.0 - CHORUS_FEEDBACK);
        assert!(min > 0.5 && max < settled + 0.1, "chorus range {min}..{max}");
    }

    #[test]
    fn test_chorus_stereo_spread() {
        let mut chorus = Chorus::new(2, 44100.0, 0.05);
        chorus.set_controls(50.0, 50.0, 100.0);

        let frames = 4410;
        let mut data = sine(frames, 2);
        chorus.process_block(&mut data, 2, frames);

        let found_difference = (0..frames).any(|i| (data[i] - data[frames + i]).abs() > 0.001);
        assert!(
            found_difference,
            "Chorus should produce stereo difference due to phase offset"
        );
    }

    #[test]
    fn flanger_with_zero_mix_is_transparent() {
        let mut flanger = Flanger::new(2, 48000.0, 0.05);
        flanger.set_controls(25.0, 60.0, 30.0, 95.0, 0.0);

        let input = sine(1024, 2);
        let mut data = input.clone();
        for _ in 0..8 {
            data.copy_from_slice(&input);
            flanger.process_block(&mut data, 2, 1024);
            assert_eq!(data, input);
        }
        assert!(flanger.feedback() > 0.9, "feedback still smoothed internally");
    }

    #[test]
    fn flanger_wet_tap_sits_at_centre_delay() {
        let mut flanger = Flanger::new(1, 44100.0, 0.05);
        flanger.set_controls(0.0, 0.0, 0.0, 0.0, 100.0);
        flanger.centre_ms = 10.0;

        let mut data = vec![0.0; 1000];
        data[0] = 1.0;
        flanger.process_block(&mut data, 1, 1000);

        assert!((data[441] - 1.0).abs() < 1e-6, "echo {}", data[441]);
        let stray: f32 = data
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != 441)
            .map(|(_, x)| x.abs())
            .sum();
        assert!(stray < 1e-6, "energy outside the tap {stray}");
    }

    #[test]
    fn flanger_feedback_ramps() {
        let mut flanger = Flanger::new(1, 48000.0, 0.05);
        flanger.set_controls(25.0, 60.0, 30.0, 80.0, 50.0);
        let mut data = vec![0.0; 240];
        flanger.process_block(&mut data, 1, 240);
        let fb = flanger.feedback();
        assert!(fb > 0.0 && fb < 0.8, "mid-ramp feedback {fb}");
        let mut data = vec![0.0; 960];
        flanger.process_block(&mut data, 1, 960);
        assert!((flanger.feedback() - 0.8).abs() < 1e-5);
    }

    #[test]
    fn full_feedback_stays_bounded() {
        let mut flanger = Flanger::new(2, 44100.0, 0.05);
        flanger.set_controls(100.0, 100.0, 100.0, 95.0, 100.0);
        let mut chorus = Chorus::new(2, 44100.0, 0.05);
        chorus.set_controls(100.0, 100.0, 100.0);
        for _ in 0..20 {
            let mut data = sine(2048, 2);
            chorus.process_block(&mut data, 2, 2048);
            flanger.process_block(&mut data, 2, 2048);
            assert!(data.iter().all(|x| x.is_finite() && x.abs() < 50.0));
        }
    }
}
