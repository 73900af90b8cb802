//! Smoothed value: exponential ramp toward a target over a fixed time.
//!
//! The ramp approaches the target geometrically and lands on it exactly when
//! the configured ramp time has elapsed, so the value is monotonic and
//! settled after `ramp_seconds`.

/// Time constants packed into one ramp: after the full ramp only
/// `exp(-SETTLE_TAUS)` of the step would remain, and that residue is snapped.
const SETTLE_TAUS: f32 = 7.0;

#[derive(Debug, Clone)]
pub struct SmoothedValue {
    current: f32,
    target: f32,
    coeff: f32,
    ramp_samples: u32,
    countdown: u32,
}

impl SmoothedValue {
    pub fn new(initial: f32) -> Self {
        Self {
            current: initial,
            target: initial,
            coeff: 1.0,
            ramp_samples: 0,
            countdown: 0,
        }
    }

    /// Configure the ramp length. Any ramp in progress finishes immediately.
    pub fn reset(&mut self, sample_rate: f64, ramp_seconds: f64) {
        self.ramp_samples = (ramp_seconds * sample_rate).round().max(0.0) as u32;
        self.coeff = if self.ramp_samples == 0 {
            1.0
        } else {
            1.0 - (-SETTLE_TAUS / self.ramp_samples as f32).exp()
        };
        self.current = self.target;
        self.countdown = 0;
    }

    /// Jump straight to `value` with no ramp.
    pub fn set_current_and_target(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.countdown = 0;
    }

    /// Start ramping toward `target`. Re-setting the same target does not
    /// restart the ramp.
    pub fn set_target(&mut self, target: f32) {
        if target == self.target {
            return;
        }
        self.target = target;
        if self.ramp_samples == 0 {
            self.current = target;
            self.countdown = 0;
        } else {
            self.countdown = self.ramp_samples;
        }
    }

    /// Advance one sample and return the new value.
    #[inline]
    pub fn next(&mut self) -> f32 {
        if self.countdown == 0 {
            self.current = self.target;
            return self.current;
        }
        self.countdown -= 1;
        if self.countdown == 0 {
            self.current = self.target;
        } else {
            self.current += self.coeff * (self.target - self.current);
        }
        self.current
    }

    #[inline]
    pub fn current(&self) -> f32 {
        self.current
    }

    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn is_smoothing(&self) -> bool {
        self.countdown > 0
    }
}
