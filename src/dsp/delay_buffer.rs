//! Delay buffer: fixed-capacity circular sample store for one channel.

/// A circular buffer with a single write head.
///
/// Every read offset is reduced modulo the capacity, so callers can pass any
/// signed index and always land inside the buffer.
#[derive(Debug, Clone)]
pub struct DelayBuffer {
    data: Vec<f32>,
    write_index: usize,
}

impl DelayBuffer {
    /// Allocate a zeroed buffer of `capacity` samples (at least 2).
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0.0; capacity.max(2)],
            write_index: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn write_index(&self) -> usize {
        self.write_index
    }

    /// Reduce any signed index into `[0, len)`.
    #[inline]
    pub fn wrap(&self, index: i64) -> usize {
        index.rem_euclid(self.data.len() as i64) as usize
    }

    /// Sample at an absolute (wrapped) index.
    #[inline]
    pub fn at(&self, index: i64) -> f32 {
        self.data[self.wrap(index)]
    }

    /// Sample written `delay` samples before the current write position.
    #[inline]
    pub fn read_behind(&self, delay: usize) -> f32 {
        self.at(self.write_index as i64 - delay as i64)
    }

    /// Overwrite the sample under the write head without moving it.
    #[inline]
    pub fn write(&mut self, sample: f32) {
        self.data[self.write_index] = sample;
    }

    /// Move the write head forward one sample.
    #[inline]
    pub fn advance(&mut self) {
        self.write_index += 1;
        if self.write_index >= self.data.len() {
            self.write_index = 0;
        }
    }

    pub fn clear(&mut self) {
        self.data.fill(0.0);
        self.write_index = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_head_wraps() {
        let mut buf = DelayBuffer::new(4);
        for _ in 0..9 {
            buf.advance();
            assert!(buf.write_index() < buf.len());
        }
        assert_eq!(buf.write_index(), 1);
    }

    #[test]
    fn negative_indices_wrap() {
        let mut buf = DelayBuffer::new(8);
        for i in 0..8 {
            buf.write(i as f32);
            buf.advance();
        }
        assert_eq!(buf.at(-1), 7.0);
        assert_eq!(buf.at(-9), 7.0);
        assert_eq!(buf.at(17), 1.0);
    }

    #[test]
    fn read_behind_returns_past_samples() {
        let mut buf = DelayBuffer::new(16);
        for i in 0..5 {
            buf.write(i as f32 + 1.0);
            buf.advance();
        }
        // Head is at 5; one behind is the last write.
        assert_eq!(buf.read_behind(1), 5.0);
        assert_eq!(buf.read_behind(5), 1.0);
        assert_eq!(buf.read_behind(6), 0.0);
    }
}
