//! Waveform capture: a decimated RMS history handed from the audio thread to
//! a display reader without locks.
//!
//! The audio thread owns the single `WaveformCapture`; any number of cloned
//! `WaveformReader`s may poll it. Slots are independent atomics, so a reader
//! racing a write may see one slot from the previous lap.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use atomic_float::AtomicF32;

#[derive(Debug)]
struct WaveformRing {
    slots: Box<[AtomicF32]>,
    write_index: AtomicUsize,
    has_new_data: AtomicBool,
}

/// `sqrt(mean of per-channel RMS²)` over a channel-major block.
pub fn block_rms(data: &[f32], num_channels: usize, num_frames: usize) -> f32 {
    if num_channels == 0 || num_frames == 0 {
        return 0.0;
    }
    let mut sum = 0.0;
    for ch in 0..num_channels {
        let samples = &data[ch * num_frames..(ch + 1) * num_frames];
        let mean_square = samples.iter().map(|x| x * x).sum::<f32>() / num_frames as f32;
        sum += mean_square;
    }
    (sum / num_channels as f32).sqrt()
}

/// Producer side, owned by the processor.
#[derive(Debug)]
pub struct WaveformCapture {
    ring: Arc<WaveformRing>,
    decimation: usize,
    counter: usize,
}

impl WaveformCapture {
    /// A ring of `len` RMS values, written every `decimation` blocks.
    pub fn new(len: usize, decimation: usize) -> Self {
        let slots: Box<[AtomicF32]> = (0..len.max(1)).map(|_| AtomicF32::new(0.0)).collect();
        Self {
            ring: Arc::new(WaveformRing {
                slots,
                write_index: AtomicUsize::new(0),
                has_new_data: AtomicBool::new(false),
            }),
            decimation: decimation.max(1),
            counter: 0,
        }
    }

    pub fn reader(&self) -> WaveformReader {
        WaveformReader {
            ring: Arc::clone(&self.ring),
        }
    }

    /// Count one block; on every `decimation`-th, push its RMS. Returns
    /// whether a value was written.
    pub fn capture(&mut self, data: &[f32], num_channels: usize, num_frames: usize) -> bool {
        self.counter += 1;
        if self.counter < self.decimation {
            return false;
        }
        self.counter = 0;

        let rms = block_rms(data, num_channels, num_frames);
        let ring = &self.ring;
        let idx = ring.write_index.load(Ordering::Relaxed);
        ring.slots[idx].store(rms, Ordering::Relaxed);
        ring.write_index.store((idx + 1) % ring.slots.len(), Ordering::Release);
        ring.has_new_data.store(true, Ordering::Release);
        true
    }

    /// Zero the history and the decimation counter.
    pub fn clear(&mut self) {
        for slot in self.ring.slots.iter() {
            slot.store(0.0, Ordering::Relaxed);
        }
        self.ring.write_index.store(0, Ordering::Release);
        self.ring.has_new_data.store(false, Ordering::Release);
        self.counter = 0;
    }
}

/// Consumer handle for a display. Cheap to clone.
#[derive(Debug, Clone)]
pub struct WaveformReader {
    ring: Arc<WaveformRing>,
}

impl WaveformReader {
    pub fn len(&self) -> usize {
        self.ring.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.slots.is_empty()
    }

    pub fn has_new_data(&self) -> bool {
        self.ring.has_new_data.load(Ordering::Acquire)
    }

    /// The most recent `n` values (capped at the ring length), oldest first.
    /// Clears the new-data flag.
    pub fn read_latest(&self, n: usize) -> Vec<f32> {
        self.ring.has_new_data.store(false, Ordering::Release);
        let len = self.ring.slots.len();
        let n = n.min(len);
        let end = self.ring.write_index.load(Ordering::Acquire);
        (0..n)
            .map(|i| {
                let idx = (end + len - n + i) % len;
                self.ring.slots[idx].load(Ordering::Relaxed)
            })
            .collect()
    }
}
