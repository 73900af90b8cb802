//! Grain engine: fixed pool of windowed voices reading from a delay buffer.
//!
//! Each channel owns `MAX_GRAINS` slots. Triggering takes the first free
//! slot; when every slot is busy the request is dropped. Nothing here
//! allocates after construction.

use std::f32::consts::PI;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::delay_buffer::DelayBuffer;

/// Voice slots per channel.
pub const MAX_GRAINS: usize = 32;
/// Smallest grain length in samples.
pub const MIN_GRAIN_SIZE: usize = 32;
/// Largest grain length in samples.
pub const MAX_GRAIN_SIZE: usize = 16384;
/// Density at or below which the plain delay tap is used instead of grains.
pub const DENSITY_THRESHOLD: f32 = 0.1;

/// One grain voice.
#[derive(Debug, Clone, Copy)]
pub struct Grain {
    pub start_pos: usize,
    pub size: usize,
    pub position: usize,
    pub active: bool,
    pub reverse: bool,
    pub amplitude: f32,
}

impl Default for Grain {
    fn default() -> Self {
        Self {
            start_pos: 0,
            size: 0,
            position: 0,
            active: false,
            reverse: false,
            amplitude: 1.0,
        }
    }
}

/// Per-block grain controls, already mapped to engine units.
#[derive(Debug, Clone, Copy)]
pub struct GrainSettings {
    /// Grain length in samples.
    pub size: usize,
    /// Grains per half grain-length; also the density factor of the cadence.
    pub density: f32,
    /// Start-position scatter as a fraction of the grain size, 0..1.
    pub spray: f32,
    pub reverse: bool,
    /// Size/amplitude/cadence jitter, 0..1.
    pub randomization: f32,
}

impl GrainSettings {
    /// Whether the grain path is used at all for this density.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.density > DENSITY_THRESHOLD
    }
}

#[derive(Debug, Clone)]
struct ChannelVoices {
    grains: [Grain; MAX_GRAINS],
    countdown: i64,
}

impl ChannelVoices {
    fn new() -> Self {
        Self {
            grains: [Grain::default(); MAX_GRAINS],
            countdown: 0,
        }
    }
}

/// Raised-cosine (Hann) window over `progress` in `[0, 1]`.
#[inline]
pub fn hann(progress: f32) -> f32 {
    0.5 * (1.0 - (2.0 * PI * progress).cos())
}

/// Grain voice pools for every channel plus the shared random source.
#[derive(Debug, Clone)]
pub struct GrainEngine {
    channels: Vec<ChannelVoices>,
    rng: SmallRng,
}

impl GrainEngine {
    pub fn new(num_channels: usize, seed: u64) -> Self {
        Self {
            channels: (0..num_channels).map(|_| ChannelVoices::new()).collect(),
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Deactivate every grain, zero the schedulers and reseed.
    pub fn reset(&mut self, seed: u64) {
        for ch in self.channels.iter_mut() {
            *ch = ChannelVoices::new();
        }
        self.rng = SmallRng::seed_from_u64(seed);
    }

    /// Uniform value in `[-1, 1)`.
    #[inline]
    fn bipolar(&mut self) -> f32 {
        self.rng.random::<f32>() * 2.0 - 1.0
    }

    /// Start a grain in the first free slot of `channel`, positioned one
    /// grain length behind the write head of `buffer`. Returns `false` when
    /// the pool is exhausted and the request was dropped.
    pub fn trigger_new_grain(
        &mut self,
        channel: usize,
        buffer: &DelayBuffer,
        size: usize,
        spray: f32,
        reverse: bool,
        randomization: f32,
    ) -> bool {
        let Some(slot) = self.channels[channel].grains.iter().position(|g| !g.active) else {
            return false;
        };

        let spray_amount = spray * self.bipolar();
        let spray_offset = (size as f32 * spray_amount) as i64;
        let start = buffer.write_index() as i64 - size as i64 + spray_offset;

        let mut grain = Grain {
            start_pos: buffer.wrap(start),
            size: size.clamp(MIN_GRAIN_SIZE, MAX_GRAIN_SIZE),
            position: 0,
            active: true,
            reverse,
            amplitude: 1.0,
        };

        if randomization > 0.0 {
            let size_variation = 1.0 + self.bipolar() * randomization * 0.5;
            let varied = (grain.size as f32 * size_variation) as usize;
            grain.size = varied.clamp(MIN_GRAIN_SIZE, MAX_GRAIN_SIZE);
            grain.amplitude *= 1.0 + self.bipolar() * randomization * 0.3;
        }

        self.channels[channel].grains[slot] = grain;
        true
    }

    /// Samples until the next trigger: half a grain divided by density,
    /// jittered by `randomization`, never below one sample.
    pub fn next_interval(&mut self, size: usize, density: f32, randomization: f32) -> i64 {
        let density_factor = density.max(f32::EPSILON);
        let base = (size as f32 * 0.5 / density_factor) as i64;
        let variation = (base as f32 * randomization * self.bipolar()) as i64;
        (base + variation).max(1)
    }

    /// Count the scheduler down one sample and trigger when it expires.
    pub fn schedule(&mut self, channel: usize, buffer: &DelayBuffer, settings: &GrainSettings) {
        self.channels[channel].countdown -= 1;
        if self.channels[channel].countdown <= 0 {
            self.trigger_new_grain(
                channel,
                buffer,
                settings.size,
                settings.spray,
                settings.reverse,
                settings.randomization,
            );
            let interval =
                self.next_interval(settings.size, settings.density, settings.randomization);
            self.channels[channel].countdown = interval;
        }
    }

    /// Sum every active grain of `channel` for this sample and advance them.
    pub fn process_active_grains(&mut self, channel: usize, buffer: &DelayBuffer) -> f32 {
        let mut output = 0.0;
        for g in self.channels[channel].grains.iter_mut() {
            if !g.active {
                continue;
            }

            let progress = g.position as f32 / g.size.max(1) as f32;
            let envelope = hann(progress);

            let read = if g.reverse {
                g.start_pos as i64 + g.size as i64 - g.position as i64
            } else {
                g.start_pos as i64 + g.position as i64
            };

            output += buffer.at(read) * envelope * g.amplitude;

            g.position += 1;
            if g.position >= g.size {
                g.active = false;
            }
        }
        output
    }

    pub fn grains(&self, channel: usize) -> &[Grain] {
        &self.channels[channel].grains
    }

    pub fn active_count(&self, channel: usize) -> usize {
        self.channels[channel].grains.iter().filter(|g| g.active).count()
    }
}
