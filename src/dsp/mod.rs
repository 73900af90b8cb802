//! DSP Engine: granular delay plus a modulation chain, in pure Rust.
//!
//! The same code runs inside an AudioWorklet (via WASM) and in the offline
//! renderer, so output is deterministic for a given seed and input.

pub mod chorus;
pub mod delay;
pub mod delay_buffer;
pub mod engine;
pub mod eq;
pub mod filter;
pub mod grain;
pub mod lfo;
pub mod mixer;
pub mod panner;
pub mod pitch;
pub mod renderer;
pub mod smoothing;
pub mod waveform;
