//! Granular processor: owns every stage and runs the per-block chain.
//!
//! Control flow per block: read parameters, granular delay with EQ and
//! feedback, LFO update, state-variable filter, pitch shift, chorus,
//! flanger, pan, then waveform capture. All buffers are allocated in
//! `prepare`; `process_block` never allocates, locks or logs past the first
//! oversized block.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::params::{ParamId, ParamStore};

use super::chorus::{Chorus, Flanger};
use super::delay::{DelaySettings, GranularDelay, delay_samples, grain_size_samples};
use super::eq::EqCoeffs;
use super::filter::{FilterMode, StateVariableFilter, cutoff_hz, modulated_cutoff, resonance_q};
use super::grain::GrainSettings;
use super::lfo::{Lfo, LfoSettings, LfoTarget, LfoWaveform, SyncDivision};
use super::panner::{Panner, modulated_pan};
use super::pitch::PitchShifter;
use super::waveform::{WaveformCapture, WaveformReader};

/// Channels the engine processes. Anything beyond is zeroed.
pub const MAX_CHANNELS: usize = 2;

/// Default grain RNG seed.
pub const DEFAULT_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

/// Sizes fixed at construction / prepare time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Delay line length per channel, in samples.
    pub max_delay_samples: usize,
    /// Pitch shifter history length per channel.
    pub pitch_buffer_len: usize,
    /// Pitch shifter grain length.
    pub pitch_grain_size: usize,
    /// RMS values kept for display.
    pub waveform_len: usize,
    /// Blocks per captured RMS value.
    pub waveform_decimation: usize,
    /// Chorus / flanger line length in ms.
    pub modulation_buffer_ms: f64,
    /// Grain randomness seed.
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_delay_samples: 192_000,
            pitch_buffer_len: 8192,
            pitch_grain_size: 1024,
            waveform_len: 512,
            waveform_decimation: 64,
            modulation_buffer_ms: 50.0,
            seed: DEFAULT_SEED,
        }
    }
}

impl EngineConfig {
    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        log::debug!("Loaded engine config: {config:?}");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_delay_samples < 2 {
            return Err(EngineError::Config(format!(
                "max_delay_samples must be at least 2, got {}",
                self.max_delay_samples
            )));
        }
        if self.pitch_buffer_len < 2 {
            return Err(EngineError::Config(format!(
                "pitch_buffer_len must be at least 2, got {}",
                self.pitch_buffer_len
            )));
        }
        if self.pitch_grain_size == 0 || self.pitch_grain_size >= self.pitch_buffer_len {
            return Err(EngineError::Config(format!(
                "pitch_grain_size must be in 1..{}, got {}",
                self.pitch_buffer_len, self.pitch_grain_size
            )));
        }
        if self.waveform_len == 0 || self.waveform_decimation == 0 {
            return Err(EngineError::Config(
                "waveform_len and waveform_decimation must be > 0".to_string(),
            ));
        }
        if !self.modulation_buffer_ms.is_finite() || self.modulation_buffer_ms <= 0.0 {
            return Err(EngineError::Config(format!(
                "modulation_buffer_ms must be finite and > 0, got {}",
                self.modulation_buffer_ms
            )));
        }
        Ok(())
    }
}

/// Host playback information for the coming block.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Transport {
    /// Tempo in beats per minute, when the host reports one.
    pub bpm: Option<f64>,
}

/// Every parameter value for one block, copied out of the store.
#[derive(Debug, Clone, Copy)]
pub struct BlockParams {
    pub delay_time: f32,
    pub feedback: f32,
    pub mix: f32,
    pub grain_size: f32,
    pub grain_density: f32,
    pub grain_spray: f32,
    pub reverse_grains: bool,
    pub randomization: f32,
    pub stereo_width: f32,
    pub eq_high: f32,
    pub eq_low: f32,
    pub filter_cutoff: f32,
    pub filter_resonance: f32,
    pub filter_mode: i32,
    pub pitch_semitones: f32,
    pub pitch_octaves: f32,
    pub pan_position: f32,
    pub lfo_rate: f32,
    pub lfo_depth: f32,
    pub lfo_target: i32,
    pub lfo_bipolar: bool,
    pub lfo_waveform: i32,
    pub lfo_tempo_sync: bool,
    pub lfo_sync_division: i32,
    pub chorus_rate: f32,
    pub chorus_depth: f32,
    pub chorus_mix: f32,
    pub flanger_delay: f32,
    pub flanger_feedback: f32,
    pub flanger_depth: f32,
    pub flanger_rate: f32,
    pub flanger_mix: f32,
}

impl BlockParams {
    pub fn read(store: &ParamStore) -> Self {
        Self {
            delay_time: store.get(ParamId::DelayTime),
            feedback: store.get(ParamId::Feedback),
            mix: store.get(ParamId::Mix),
            grain_size: store.get(ParamId::GrainSize),
            grain_density: store.get(ParamId::GrainDensity),
            grain_spray: store.get(ParamId::GrainSpray),
            reverse_grains: store.get_bool(ParamId::ReverseGrains),
            randomization: store.get(ParamId::Randomization),
            stereo_width: store.get(ParamId::StereoWidth),
            eq_high: store.get(ParamId::EqHigh),
            eq_low: store.get(ParamId::EqLow),
            filter_cutoff: store.get(ParamId::FilterCutoff),
            filter_resonance: store.get(ParamId::FilterResonance),
            filter_mode: store.get_index(ParamId::FilterMode),
            pitch_semitones: store.get(ParamId::PitchSemitones),
            pitch_octaves: store.get(ParamId::PitchOctaves),
            pan_position: store.get(ParamId::PanPosition),
            lfo_rate: store.get(ParamId::LfoRate),
            lfo_depth: store.get(ParamId::LfoDepth),
            lfo_target: store.get_index(ParamId::LfoTarget),
            lfo_bipolar: store.get_bool(ParamId::LfoBipolar),
            lfo_waveform: store.get_index(ParamId::LfoWaveform),
            lfo_tempo_sync: store.get_bool(ParamId::LfoTempoSync),
            lfo_sync_division: store.get_index(ParamId::LfoSyncDivision),
            chorus_rate: store.get(ParamId::ChorusRate),
            chorus_depth: store.get(ParamId::ChorusDepth),
            chorus_mix: store.get(ParamId::ChorusMix),
            flanger_delay: store.get(ParamId::FlangerDelay),
            flanger_feedback: store.get(ParamId::FlangerFeedback),
            flanger_depth: store.get(ParamId::FlangerDepth),
            flanger_rate: store.get(ParamId::FlangerRate),
            flanger_mix: store.get(ParamId::FlangerMix),
        }
    }

    /// Delay-section controls in engine units.
    pub fn delay_settings(&self, sample_rate: f32, capacity: usize) -> DelaySettings {
        DelaySettings {
            delay_samples: delay_samples(self.delay_time, sample_rate, capacity),
            feedback: self.feedback.clamp(0.0, 0.95),
            mix: self.mix.clamp(0.0, 100.0) / 100.0,
            stereo_width: self.stereo_width.clamp(0.0, 100.0) / 100.0,
            eq: EqCoeffs::new(self.eq_high, self.eq_low, sample_rate),
            grains: GrainSettings {
                size: grain_size_samples(self.grain_size, sample_rate),
                density: self.grain_density,
                spray: self.grain_spray.clamp(0.0, 100.0) / 100.0,
                reverse: self.reverse_grains,
                randomization: self.randomization.clamp(0.0, 100.0) / 100.0,
            },
        }
    }

    pub fn lfo_settings(&self) -> LfoSettings {
        LfoSettings {
            rate: self.lfo_rate,
            tempo_sync: self.lfo_tempo_sync,
            division: SyncDivision::from_index(self.lfo_sync_division).unwrap_or(SyncDivision::Bar),
            waveform: LfoWaveform::from_index(self.lfo_waveform).unwrap_or(LfoWaveform::Sine),
            bipolar: self.lfo_bipolar,
        }
    }
}

/// Every stage, built for one sample rate.
#[derive(Debug)]
struct Prepared {
    sample_rate: f32,
    max_block_size: usize,
    delay: GranularDelay,
    lfo: Lfo,
    filter: StateVariableFilter,
    pitch: PitchShifter,
    chorus: Chorus,
    flanger: Flanger,
    panner: Panner,
    warned_channels: bool,
}

/// The full effect chain over a shared parameter store.
#[derive(Debug)]
pub struct GranularProcessor {
    params: Arc<ParamStore>,
    config: EngineConfig,
    transport: Transport,
    waveform: WaveformCapture,
    state: Option<Prepared>,
}

impl GranularProcessor {
    pub fn new(params: Arc<ParamStore>, config: EngineConfig) -> Self {
        let waveform = WaveformCapture::new(config.waveform_len, config.waveform_decimation);
        Self {
            params,
            config,
            transport: Transport::default(),
            waveform,
            state: None,
        }
    }

    /// Allocate every buffer for `sample_rate` and reset all state.
    pub fn prepare(&mut self, sample_rate: f64, max_block_size: usize) -> Result<(), EngineError> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(EngineError::InvalidSampleRate(sample_rate));
        }
        if max_block_size == 0 {
            return Err(EngineError::InvalidBlockSize(max_block_size));
        }
        self.config.validate()?;
        let cfg = &self.config;

        let modulation_seconds = cfg.modulation_buffer_ms / 1000.0;
        let mut pitch = PitchShifter::new(MAX_CHANNELS, cfg.pitch_buffer_len, cfg.pitch_grain_size);
        pitch.set_sample_rate(sample_rate);
        let mut panner = Panner::new();
        panner.set_sample_rate(sample_rate);

        self.state = Some(Prepared {
            sample_rate: sample_rate as f32,
            max_block_size,
            delay: GranularDelay::new(MAX_CHANNELS, cfg.max_delay_samples, cfg.seed),
            lfo: Lfo::new(),
            filter: StateVariableFilter::new(FilterMode::Lowpass, MAX_CHANNELS, sample_rate),
            pitch,
            chorus: Chorus::new(MAX_CHANNELS, sample_rate, modulation_seconds),
            flanger: Flanger::new(MAX_CHANNELS, sample_rate, modulation_seconds),
            panner,
            warned_channels: false,
        });
        self.waveform.clear();

        log::info!(
            "Prepared granular processor: {sample_rate} Hz, max block {max_block_size}, \
             delay line {} samples, pitch buffer {}",
            cfg.max_delay_samples,
            cfg.pitch_buffer_len
        );
        Ok(())
    }

    pub fn is_prepared(&self) -> bool {
        self.state.is_some()
    }

    pub fn sample_rate(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.sample_rate as f64)
    }

    pub fn max_block_size(&self) -> Option<usize> {
        self.state.as_ref().map(|s| s.max_block_size)
    }

    pub fn params(&self) -> &Arc<ParamStore> {
        &self.params
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_transport(&mut self, transport: Transport) {
        self.transport = transport;
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// The shared LFO, once prepared.
    pub fn lfo(&self) -> Option<&Lfo> {
        self.state.as_ref().map(|s| &s.lfo)
    }

    /// Display-side handle onto the RMS history.
    pub fn waveform(&self) -> WaveformReader {
        self.waveform.reader()
    }

    /// Clear every buffer and modulation state without reallocating.
    pub fn reset(&mut self) {
        if let Some(st) = self.state.as_mut() {
            st.delay.clear(self.config.seed);
            st.lfo.reset();
            st.filter.reset();
            st.pitch.reset();
            st.chorus.clear();
            st.flanger.clear();
            st.panner.reset();
        }
        self.waveform.clear();
    }

    /// Process a channel-major block in place. Does nothing before `prepare`.
    pub fn process_block(&mut self, data: &mut [f32], num_channels: usize, num_frames: usize) {
        let Some(st) = self.state.as_mut() else {
            return;
        };
        if num_channels == 0 {
            return;
        }
        let num_frames = num_frames.min(data.len() / num_channels);
        if num_frames == 0 {
            return;
        }

        if num_channels > MAX_CHANNELS {
            data[MAX_CHANNELS * num_frames..num_channels * num_frames].fill(0.0);
            if !st.warned_channels {
                st.warned_channels = true;
                log::warn!(
                    "Block has {num_channels} channels; only the first {MAX_CHANNELS} are processed"
                );
            }
        }
        let channels = num_channels.min(MAX_CHANNELS);
        let audio = &mut data[..channels * num_frames];

        let p = BlockParams::read(&self.params);
        let sr = st.sample_rate;

        // delay + grains + EQ + feedback
        let delay_settings = p.delay_settings(sr, st.delay.capacity());
        st.delay.process_block(audio, channels, num_frames, &delay_settings);

        // LFO, once per block
        let lfo_settings = p.lfo_settings();
        st.lfo.update(&lfo_settings, self.transport.bpm, num_frames, sr);
        let lfo_value = st.lfo.value(lfo_settings.waveform, lfo_settings.bipolar);
        let lfo_target = LfoTarget::from_index(p.lfo_target);

        // filter
        st.filter.set_mode_index(p.filter_mode);
        let mut cutoff = cutoff_hz(p.filter_cutoff);
        if lfo_target == Some(LfoTarget::Cutoff) && p.lfo_depth > 0.0 {
            cutoff = modulated_cutoff(cutoff, lfo_value, p.lfo_depth);
        }
        st.filter.set_params(cutoff, resonance_q(p.filter_resonance));
        st.filter.process_block(audio, channels, num_frames);

        st.pitch
            .process_block(audio, channels, num_frames, p.pitch_semitones, p.pitch_octaves);

        st.chorus.set_controls(p.chorus_rate, p.chorus_depth, p.chorus_mix);
        st.chorus.process_block(audio, channels, num_frames);

        st.flanger.set_controls(
            p.flanger_delay,
            p.flanger_depth,
            p.flanger_rate,
            p.flanger_feedback,
            p.flanger_mix,
        );
        st.flanger.process_block(audio, channels, num_frames);

        if channels == 2 {
            let mut pan = p.pan_position;
            if lfo_target == Some(LfoTarget::Pan) && p.lfo_depth > 0.0 {
                pan = modulated_pan(pan, lfo_value, p.lfo_depth);
            }
            st.panner.set_target(pan);
            st.panner.process_block(audio, channels, num_frames);
        }

        for x in audio.iter_mut() {
            if !x.is_finite() {
                *x = 0.0;
            }
        }
        st.filter.flush_non_finite();

        self.waveform.capture(audio, channels, num_frames);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 48000.0;
    const BLOCK: usize = 512;

    fn processor() -> GranularProcessor {
        let mut proc = GranularProcessor::new(Arc::new(ParamStore::new()), EngineConfig::default());
        proc.prepare(SR, BLOCK).unwrap();
        proc
    }

    /// Run a mono signal duplicated onto two channels through the processor
    /// and return the left output.
    fn run_stereo(proc: &mut GranularProcessor, input: &[f32]) -> Vec<f32> {
        let mut out = Vec::with_capacity(input.len());
        for chunk in input.chunks(BLOCK) {
            let n = chunk.len();
            let mut data = Vec::with_capacity(2 * n);
            data.extend_from_slice(chunk);
            data.extend_from_slice(chunk);
            proc.process_block(&mut data, 2, n);
            out.extend_from_slice(&data[..n]);
        }
        out
    }

    fn sine(freq: f32, seconds: f32) -> Vec<f32> {
        let n = (seconds * SR as f32) as usize;
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / SR as f32).sin() * 0.5)
            .collect()
    }

    fn rms(x: &[f32]) -> f32 {
        (x.iter().map(|s| s * s).sum::<f32>() / x.len() as f32).sqrt()
    }

    fn peak(x: &[f32]) -> f32 {
        x.iter().fold(0.0_f32, |m, s| m.max(s.abs()))
    }

    #[test]
    fn untouched_before_prepare() {
        let mut proc = GranularProcessor::new(Arc::new(ParamStore::new()), EngineConfig::default());
        let mut data = vec![0.25; 2 * 64];
        proc.process_block(&mut data, 2, 64);
        assert!(data.iter().all(|&x| x == 0.25));
        assert!(!proc.is_prepared());
    }

    #[test]
    fn prepare_rejects_bad_arguments() {
        let mut proc = GranularProcessor::new(Arc::new(ParamStore::new()), EngineConfig::default());
        assert!(matches!(proc.prepare(0.0, 512), Err(EngineError::InvalidSampleRate(_))));
        assert!(matches!(proc.prepare(f64::NAN, 512), Err(EngineError::InvalidSampleRate(_))));
        assert!(matches!(proc.prepare(44100.0, 0), Err(EngineError::InvalidBlockSize(0))));
        assert!(proc.prepare(44100.0, 256).is_ok());
        assert_eq!(proc.sample_rate(), Some(44100.0));
        assert_eq!(proc.max_block_size(), Some(256));
    }

    #[test]
    fn plain_tap_echo_arrives_at_delay_time() {
        let mut proc = processor();
        let params = proc.params().clone();
        params.set(ParamId::DelayTime, 400.0);
        params.set(ParamId::Feedback, 0.35);
        params.set(ParamId::Mix, 35.0);
        params.set(ParamId::GrainDensity, 0.1);
        params.set(ParamId::StereoWidth, 0.0);

        let input = sine(1000.0, 0.75);
        let out = run_stereo(&mut proc, &input);
        let ms = |t: f32| (t * SR as f32 / 1000.0) as usize;

        let before = rms(&out[ms(300.0)..ms(390.0)]);
        let after = rms(&out[ms(420.0)..ms(700.0)]);
        // 400 ms is a whole number of 1 kHz cycles: the echo adds in phase
        assert!(after > before * 1.3, "echo missing: before {before}, after {after}");

        // plain tap: steady amplitude, no grain envelopes
        let windows: Vec<f32> = (0..10)
            .map(|k| {
                let start = 420.0 + 25.0 * k as f32;
                peak(&out[ms(start)..ms(start + 5.0)])
            })
            .collect();
        let lo = windows.iter().cloned().fold(f32::MAX, f32::min);
        let hi = windows.iter().cloned().fold(0.0, f32::max);
        assert!(hi / lo < 1.02, "amplitude wobble {windows:?}");
    }

    #[test]
    fn grain_path_is_audible_and_bounded() {
        let mut proc = processor();
        let params = proc.params().clone();
        params.set(ParamId::GrainDensity, 2.0);
        params.set(ParamId::GrainSize, 60.0);
        params.set(ParamId::GrainSpray, 0.0);
        params.set(ParamId::Randomization, 0.0);
        params.set(ParamId::Mix, 100.0);
        params.set(ParamId::Feedback, 0.0);

        let input = sine(440.0, 0.5);
        let out = run_stereo(&mut proc, &input);
        assert!(out.iter().all(|x| x.is_finite() && x.abs() <= 1.0));
        assert!(rms(&out[12000..]) > 0.05, "grain output too quiet");
    }

    #[test]
    fn default_pitch_is_transparent_and_centre_pan_is_equal() {
        let mut proc = processor();
        let params = proc.params().clone();
        params.set(ParamId::Mix, 0.0);

        let n = 256;
        let mut data: Vec<f32> = (0..2 * n).map(|i| ((i % n) as f32 * 0.01).sin() * 0.3).collect();
        proc.process_block(&mut data, 2, n);
        for i in 0..n {
            assert!((data[i] - data[n + i]).abs() < 1e-6, "centre pan differs at {i}");
        }
    }

    #[test]
    fn flanger_mix_zero_ignores_feedback() {
        let input = sine(300.0, 0.2);
        let render = |feedback: f32| {
            let mut proc = processor();
            let params = proc.params().clone();
            params.set(ParamId::FlangerMix, 0.0);
            params.set(ParamId::FlangerFeedback, feedback);
            run_stereo(&mut proc, &input)
        };
        assert_eq!(render(0.0), render(95.0));
    }

    /// Process `blocks` stereo blocks of `input` (duplicated onto both
    /// channels) and return the last block's left and right halves.
    fn last_stereo_block(
        proc: &mut GranularProcessor,
        input: &[f32],
        blocks: usize,
    ) -> (Vec<f32>, Vec<f32>) {
        let mut data = Vec::new();
        for k in 0..blocks {
            let chunk = &input[k * BLOCK..(k + 1) * BLOCK];
            data.clear();
            data.extend_from_slice(chunk);
            data.extend_from_slice(chunk);
            proc.process_block(&mut data, 2, BLOCK);
        }
        (data[..BLOCK].to_vec(), data[BLOCK..].to_vec())
    }

    fn filter_cutoff(proc: &GranularProcessor) -> f64 {
        proc.state.as_ref().map_or(0.0, |st| st.filter.cutoff)
    }

    fn lfo_processor(target: f32, depth: f32) -> GranularProcessor {
        let proc = processor();
        let params = proc.params().clone();
        params.set(ParamId::Mix, 0.0);
        params.set(ParamId::LfoRate, 100.0);
        params.set(ParamId::LfoTarget, target);
        params.set(ParamId::LfoDepth, depth);
        proc
    }

    #[test]
    fn lfo_on_pan_moves_balance_and_leaves_filter() {
        let mut proc = lfo_processor(1.0, 100.0);
        let input = sine(1000.0, 0.1);
        // 10 Hz LFO: the first blocks sit in the positive half cycle
        let (left, right) = last_stereo_block(&mut proc, &input, 3);
        assert!(rms(&right) > rms(&left) * 1.2, "left {} right {}", rms(&left), rms(&right));
        assert_eq!(filter_cutoff(&proc), cutoff_hz(70.0) as f64);
    }

    #[test]
    fn lfo_on_cutoff_moves_filter_and_leaves_pan() {
        let input = sine(12000.0, 0.1);
        let mut still = lfo_processor(0.0, 0.0);
        let (still_left, _) = last_stereo_block(&mut still, &input, 2);

        let mut proc = lfo_processor(0.0, 1.0);
        let (left, right) = last_stereo_block(&mut proc, &input, 2);
        let base = cutoff_hz(70.0) as f64;
        assert!(filter_cutoff(&proc) - base > 500.0, "cutoff {}", filter_cutoff(&proc));
        assert_ne!(left, still_left);
        for i in 0..BLOCK {
            assert!((left[i] - right[i]).abs() < 1e-6, "pan moved at {i}");
        }
    }

    #[test]
    fn extra_channels_are_zeroed() {
        let mut proc = processor();
        let n = 64;
        let mut data = vec![0.5; 4 * n];
        proc.process_block(&mut data, 4, n);
        assert!(data[2 * n..].iter().all(|&x| x == 0.0));
        assert!(data[..2 * n].iter().any(|&x| x != 0.0));
    }

    #[test]
    fn mono_blocks_are_processed() {
        let mut proc = processor();
        let mut data = vec![0.5; 128];
        proc.process_block(&mut data, 1, 128);
        assert!(data.iter().all(|x| x.is_finite()));
        assert!(data.iter().any(|&x| x != 0.5));
    }

    #[test]
    fn non_finite_input_is_flushed() {
        let mut proc = processor();
        let mut data = vec![0.1; 2 * BLOCK];
        data[10] = f32::NAN;
        data[BLOCK + 20] = f32::INFINITY;
        proc.process_block(&mut data, 2, BLOCK);
        assert!(data.iter().all(|x| x.is_finite()), "first block not flushed");

        for _ in 0..8 {
            let mut data = vec![0.1; 2 * BLOCK];
            proc.process_block(&mut data, 2, BLOCK);
            assert!(data.iter().all(|x| x.is_finite()), "NaN leaked into later blocks");
        }
    }

    #[test]
    fn tempo_sync_follows_transport() {
        let mut proc = processor();
        let params = proc.params().clone();
        params.set(ParamId::LfoTempoSync, 1.0);
        params.set(ParamId::LfoSyncDivision, 0.0);

        let mut data = vec![0.0; 2 * BLOCK];
        proc.set_transport(Transport { bpm: Some(120.0) });
        proc.process_block(&mut data, 2, BLOCK);
        let lfo = proc.lfo().unwrap();
        assert!((lfo.frequency() - 0.5).abs() < 1e-6);

        proc.set_transport(Transport::default());
        proc.process_block(&mut data, 2, BLOCK);
        let free = Lfo::frequency_for(&BlockParams::read(&params).lfo_settings(), None);
        assert!((proc.lfo().unwrap().frequency() - free).abs() < 1e-6);
    }

    #[test]
    fn waveform_fills_every_decimation_blocks() {
        let config = EngineConfig {
            waveform_decimation: 4,
            ..EngineConfig::default()
        };
        let mut proc = GranularProcessor::new(Arc::new(ParamStore::new()), config);
        proc.prepare(SR, BLOCK).unwrap();
        let reader = proc.waveform();

        for _ in 0..3 {
            let mut data = vec![0.3; 2 * BLOCK];
            proc.process_block(&mut data, 2, BLOCK);
        }
        assert!(!reader.has_new_data());
        let mut data = vec![0.3; 2 * BLOCK];
        proc.process_block(&mut data, 2, BLOCK);
        assert!(reader.has_new_data());
        let latest = reader.read_latest(1);
        assert!(latest[0] > 0.0, "rms {latest:?}");
    }

    #[test]
    fn reset_silences_tails() {
        let mut proc = processor();
        let params = proc.params().clone();
        params.set(ParamId::Feedback, 0.9);
        params.set(ParamId::Mix, 100.0);
        params.set(ParamId::DelayTime, 20.0);
        run_stereo(&mut proc, &sine(220.0, 0.2));

        proc.reset();
        let out = run_stereo(&mut proc, &vec![0.0; 4 * BLOCK]);
        assert!(out.iter().all(|&x| x == 0.0), "tail survived reset");
    }

    #[test]
    fn config_from_json() {
        let cfg = EngineConfig::from_json(r#"{"max_delay_samples": 96000, "seed": 7}"#).unwrap();
        assert_eq!(cfg.max_delay_samples, 96000);
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.pitch_buffer_len, 8192);

        let err = EngineConfig::from_json(r#"{"pitch_grain_size": 9000}"#).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)), "got {err}");
        let err = EngineConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)), "got {err}");
    }
}
