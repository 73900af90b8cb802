//! Feedback/stereo mixer: limits the feedback path, computes the
//! cross-channel tap and blends dry with wet.

/// Above this magnitude the feedback sample is bent with a tanh curve.
pub const SOFT_CLIP_KNEE: f32 = 0.95;
/// Gain of the opposite-channel tap, scaled further by stereo width.
pub const CROSS_FEED_GAIN: f32 = 0.3;
/// Cross tap length as a fraction of the main delay, per channel.
pub const CROSS_FEED_RATIO: [f32; 2] = [0.7, 0.8];

/// Clamp a feedback sample to [-1, 1] and round off the last 5% with a tanh
/// curve so it never hits the rails hard. Non-finite input becomes silence.
#[inline]
pub fn limit_feedback(x: f32) -> f32 {
    if !x.is_finite() {
        return 0.0;
    }
    let x = x.clamp(-1.0, 1.0);
    if x.abs() > SOFT_CLIP_KNEE {
        let excess = x.abs() - SOFT_CLIP_KNEE;
        let bent = SOFT_CLIP_KNEE + (1.0 - SOFT_CLIP_KNEE) * (excess * 10.0).tanh();
        bent.copysign(x)
    } else {
        x
    }
}

/// Length of the opposite-channel tap for `channel` given the main delay.
#[inline]
pub fn cross_feed_delay(delay_samples: usize, channel: usize) -> usize {
    (delay_samples as f32 * CROSS_FEED_RATIO[channel.min(1)]) as usize
}

/// `dry*(1-mix) + wet*mix`.
#[inline]
pub fn dry_wet(dry: f32, wet: f32, mix: f32) -> f32 {
    dry * (1.0 - mix) + wet * mix
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_knee_is_untouched() {
        for x in [-0.95_f32, -0.5, 0.0, 0.3, 0.95] {
            assert_eq!(limit_feedback(x), x);
        }
    }

    #[test]
    fn never_exceeds_unity() {
        // input in [-1,1] plus feedback up to 0.95 of a full-scale tap
        let mut x = -1.95_f32;
        while x <= 1.95 {
            let y = limit_feedback(x);
            assert!(y.abs() <= 1.0, "limit_feedback({x}) = {y}");
            x += 0.01;
        }
        assert!(limit_feedback(100.0) < 1.0);
    }

    #[test]
    fn continuous_at_knee() {
        let just_above = limit_feedback(SOFT_CLIP_KNEE + 1e-4);
        assert!((just_above - SOFT_CLIP_KNEE).abs() < 1e-3);
        assert!(limit_feedback(-0.97) < -0.95);
    }

    #[test]
    fn non_finite_is_silenced() {
        assert_eq!(limit_feedback(f32::NAN), 0.0);
        assert_eq!(limit_feedback(f32::INFINITY), 0.0);
    }

    #[test]
    fn dry_wet_endpoints() {
        assert_eq!(dry_wet(0.4, -0.2, 0.0), 0.4);
        assert_eq!(dry_wet(0.4, -0.2, 1.0), -0.2);
    }

    #[test]
    fn cross_feed_ratios() {
        let left = cross_feed_delay(1000, 0);
        let right = cross_feed_delay(1000, 1);
        assert!((699..=700).contains(&left), "left tap {left}");
        assert!((799..=800).contains(&right), "right tap {right}");
        assert_eq!(cross_feed_delay(1000, 5), right);
    }
}
