pub mod dsp;
pub mod error;
pub mod params;

use std::sync::Arc;

use crate::dsp::engine::{EngineConfig, GranularProcessor, Transport};
use crate::dsp::waveform::WaveformReader;
use crate::params::ParamStore;
use wasm_bindgen::prelude::*;

pub use crate::error::EngineError;
pub use crate::params::ParamId;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the granular_delay_core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: every parameter's id, name, range, skew, default and kind.
#[wasm_bindgen]
pub fn param_specs() -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(params::specs()).map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// Build a parameter store, restored from `state` when one is given.
fn store_from_state(state: Option<Vec<u8>>) -> Result<Arc<ParamStore>, EngineError> {
    let store = ParamStore::new();
    if let Some(bytes) = state {
        store.load_state(&bytes)?;
    }
    Ok(Arc::new(store))
}

/// WASM-exposed: run a planar buffer through the full chain and return WAV
/// bytes. `state` is an optional blob from `WasmGranularDelay::save_state`.
#[wasm_bindgen]
pub fn render_buffer_wav(
    input: &[f32],
    channels: usize,
    sample_rate: u32,
    block_size: usize,
    state: Option<Vec<u8>>,
) -> Result<Vec<u8>, JsValue> {
    let store = store_from_state(state).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    dsp::renderer::render_wav(
        store,
        EngineConfig::default(),
        sample_rate,
        input,
        channels,
        block_size,
    )
    .map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: like `render_buffer_wav` but returns the processed planar
/// f32 samples.
#[wasm_bindgen]
pub fn render_buffer_samples(
    input: &[f32],
    channels: usize,
    sample_rate: u32,
    block_size: usize,
    state: Option<Vec<u8>>,
) -> Result<Vec<f32>, JsValue> {
    let store = store_from_state(state).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    dsp::renderer::render_planar(
        store,
        EngineConfig::default(),
        sample_rate as f64,
        input,
        channels,
        block_size,
    )
    .map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed real-time processor for an AudioWorklet.
#[wasm_bindgen]
pub struct WasmGranularDelay {
    params: Arc<ParamStore>,
    processor: GranularProcessor,
    waveform: WaveformReader,
}

#[wasm_bindgen]
impl WasmGranularDelay {
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: f64, max_block: usize) -> Result<WasmGranularDelay, JsValue> {
        let params = Arc::new(ParamStore::new());
        let mut processor = GranularProcessor::new(Arc::clone(&params), EngineConfig::default());
        processor
            .prepare(sample_rate, max_block)
            .map_err(|e| JsValue::from_str(&format!("{e}")))?;
        let waveform = processor.waveform();
        Ok(Self {
            params,
            processor,
            waveform,
        })
    }

    /// Process a channel-major block in place. Frames are inferred from the
    /// slice length.
    pub fn process(&mut self, data: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }
        let frames = data.len() / channels;
        self.processor.process_block(data, channels, frames);
    }

    pub fn set_param(&self, id: &str, value: f32) -> Result<(), JsValue> {
        self.params
            .set_by_name(id, value)
            .map_err(|e| JsValue::from_str(&format!("{e}")))
    }

    pub fn get_param(&self, id: &str) -> Result<f32, JsValue> {
        self.params.get_by_name(id).map_err(|e| JsValue::from_str(&format!("{e}")))
    }

    /// Host tempo for LFO sync.
    pub fn set_tempo(&mut self, bpm: f64) {
        self.processor.set_transport(Transport { bpm: Some(bpm) });
    }

    /// Forget the host tempo; a synced LFO falls back to its free rate.
    pub fn clear_tempo(&mut self) {
        self.processor.set_transport(Transport::default());
    }

    pub fn has_new_waveform(&self) -> bool {
        self.waveform.has_new_data()
    }

    /// Latest `n` RMS values, oldest first.
    pub fn read_waveform(&self, n: usize) -> Vec<f32> {
        self.waveform.read_latest(n)
    }

    pub fn save_state(&self) -> Result<Vec<u8>, JsValue> {
        self.params.save_state().map_err(|e| JsValue::from_str(&format!("{e}")))
    }

    /// Restore parameters from a saved blob. A blob that fails to decode
    /// resets every parameter to its default; returns whether it loaded.
    pub fn load_state(&mut self, bytes: &[u8]) -> bool {
        match self.params.load_state(bytes) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("failed to load state, using defaults: {e}");
                self.params.reset_to_defaults();
                false
            }
        }
    }

    /// Clear delay lines and modulation state.
    pub fn reset(&mut self) {
        self.processor.reset();
    }
}
