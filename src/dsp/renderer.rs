//! Offline renderer: runs the full processor over a whole planar buffer and
//! optionally encodes the result as a WAV byte buffer.

use std::sync::Arc;

use crate::error::EngineError;
use crate::params::ParamStore;

use super::engine::{EngineConfig, GranularProcessor};

/// Process `input` (planar: all of channel 0, then all of channel 1, ...)
/// in blocks of `block_size` frames and return the processed copy in the
/// same layout.
pub fn render_planar(
    params: Arc<ParamStore>,
    config: EngineConfig,
    sample_rate: f64,
    input: &[f32],
    channels: usize,
    block_size: usize,
) -> Result<Vec<f32>, EngineError> {
    if channels == 0 {
        return Err(EngineError::InvalidChannelCount(channels));
    }
    let mut processor = GranularProcessor::new(params, config);
    processor.prepare(sample_rate, block_size)?;

    let frames = input.len() / channels;
    let mut output = input[..frames * channels].to_vec();
    let mut scratch = vec![0.0; block_size * channels];

    let mut start = 0;
    while start < frames {
        let n = block_size.min(frames - start);
        for ch in 0..channels {
            let src = &output[ch * frames + start..ch * frames + start + n];
            scratch[ch * n..(ch + 1) * n].copy_from_slice(src);
        }
        processor.process_block(&mut scratch[..channels * n], channels, n);
        for ch in 0..channels {
            let dst = ch * frames + start;
            output[dst..dst + n].copy_from_slice(&scratch[ch * n..(ch + 1) * n]);
        }
        start += n;
    }

    Ok(output)
}

/// Render like `render_planar` and encode as 16-bit interleaved PCM WAV.
pub fn render_wav(
    params: Arc<ParamStore>,
    config: EngineConfig,
    sample_rate: u32,
    input: &[f32],
    channels: usize,
    block_size: usize,
) -> Result<Vec<u8>, EngineError> {
    let planar = render_planar(params, config, sample_rate as f64, input, channels, block_size)?;
    let pcm = interleave_pcm_i16(&planar, channels);
    Ok(encode_wav(&pcm, sample_rate, channels as u16))
}

/// Planar f32 to interleaved i16 PCM.
fn interleave_pcm_i16(planar: &[f32], channels: usize) -> Vec<i16> {
    let frames = planar.len() / channels;
    let mut pcm = Vec::with_capacity(frames * channels);
    for i in 0..frames {
        for ch in 0..channels {
            let s = planar[ch * frames + i] as f64;
            pcm.push((s * 32767.0).round().clamp(-32768.0, 32767.0) as i16);
        }
    }
    pcm
}

/// Encode interleaved i16 PCM samples to a WAV byte buffer.
fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    let bits_per_sample: u16 = 16;
    let byte_rate = sample_rate * channels as u32 * (bits_per_sample as u32 / 8);
    let block_align = channels * (bits_per_sample / 8);
    let data_size = (samples.len() * 2) as u32;
    let file_size = 36 + data_size;

    let mut buf = Vec::with_capacity(44 + data_size as usize);

    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_size.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    // fmt chunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes()); // chunk size
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&bits_per_sample.to_le_bytes());

    // data chunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for &sample in samples {
        buf.extend_from_slice(&sample.to_le_bytes());
    }

    buf
}
