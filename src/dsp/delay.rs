//! Granular delay: circular delay lines with a grain cloud tap, feedback EQ,
//! soft-limited feedback and opposite-channel cross-feed.

use super::delay_buffer::DelayBuffer;
use super::eq::{EqCoeffs, EqStage};
use super::grain::{GrainEngine, GrainSettings};
use super::mixer::{CROSS_FEED_GAIN, cross_feed_delay, dry_wet, limit_feedback};

/// Shortest / longest grain the delay section will request, in samples,
/// before the grain engine's own bounds apply.
pub const GRAIN_REQUEST_RANGE: (usize, usize) = (64, 8192);

/// Controls for one block, already in engine units.
#[derive(Debug, Clone, Copy)]
pub struct DelaySettings {
    /// Plain tap / cross-feed reference length in samples.
    pub delay_samples: usize,
    /// Feedback gain (0.0 to 0.95).
    pub feedback: f32,
    /// Dry/wet mix (0.0 = fully dry, 1.0 = fully wet).
    pub mix: f32,
    /// Cross-feed amount (0.0 to 1.0).
    pub stereo_width: f32,
    pub eq: EqCoeffs,
    pub grains: GrainSettings,
}

/// Delay time in milliseconds to a tap length valid for `capacity`.
pub fn delay_samples(delay_ms: f32, sample_rate: f32, capacity: usize) -> usize {
    let samples = (delay_ms * sample_rate / 1000.0) as i64;
    samples.clamp(1, capacity as i64 - 1) as usize
}

/// Grain length in milliseconds to samples.
pub fn grain_size_samples(grain_ms: f32, sample_rate: f32) -> usize {
    let samples = (grain_ms * sample_rate / 1000.0) as i64;
    samples.clamp(GRAIN_REQUEST_RANGE.0 as i64, GRAIN_REQUEST_RANGE.1 as i64) as usize
}

/// Per-channel delay lines plus the grain voices that read them.
#[derive(Debug, Clone)]
pub struct GranularDelay {
    buffers: Vec<DelayBuffer>,
    eq: Vec<EqStage>,
    grains: GrainEngine,
}

impl GranularDelay {
    /// Allocate `num_channels` lines of `capacity` samples each.
    pub fn new(num_channels: usize, capacity: usize, seed: u64) -> Self {
        Self {
            buffers: (0..num_channels).map(|_| DelayBuffer::new(capacity)).collect(),
            eq: vec![EqStage::default(); num_channels],
            grains: GrainEngine::new(num_channels, seed),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffers.first().map_or(0, DelayBuffer::len)
    }

    pub fn num_channels(&self) -> usize {
        self.buffers.len()
    }

    pub fn buffer(&self, channel: usize) -> &DelayBuffer {
        &self.buffers[channel]
    }

    pub fn grains(&self) -> &GrainEngine {
        &self.grains
    }

    /// Process one sample of `channel`. `stereo` enables the cross-feed tap
    /// from the other channel's line.
    #[inline]
    pub fn process(&mut self, input: f32, channel: usize, stereo: bool, s: &DelaySettings) -> f32 {
        let tap = if s.grains.is_active() {
            self.grains.schedule(channel, &self.buffers[channel], &s.grains);
            self.grains.process_active_grains(channel, &self.buffers[channel])
        } else {
            self.buffers[channel].read_behind(s.delay_samples)
        };

        let mut delayed = self.eq[channel].process(tap, &s.eq);

        let feedback_sample = limit_feedback(input + delayed * s.feedback);
        self.buffers[channel].write(feedback_sample);

        if stereo && s.stereo_width > 0.0 && self.buffers.len() > 1 {
            let other = if channel == 0 { 1 } else { 0 };
            let cross = cross_feed_delay(s.delay_samples, channel);
            let read = self.buffers[channel].write_index() as i64 - cross as i64;
            delayed += self.buffers[other].at(read) * s.stereo_width * CROSS_FEED_GAIN;
        }

        let out = dry_wet(input, delayed, s.mix);
        self.buffers[channel].advance();
        out
    }

    /// Process a channel-major block in place, one channel after another.
    pub fn process_block(
        &mut self,
        data: &mut [f32],
        num_channels: usize,
        num_frames: usize,
        s: &DelaySettings,
    ) {
        let channels = num_channels.min(self.buffers.len());
        let stereo = channels == 2;
        for ch in 0..channels {
            let samples = &mut data[ch * num_frames..(ch + 1) * num_frames];
            for x in samples.iter_mut() {
                *x = self.process(*x, ch, stereo, s);
            }
        }
    }

    /// Zero the lines, filter state and grain voices.
    pub fn clear(&mut self, seed: u64) {
        for b in self.buffers.iter_mut() {
            b.clear();
        }
        for eq in self.eq.iter_mut() {
            eq.reset();
        }
        self.grains.reset(seed);
    }
}
