//! First-order DC-blocking high-pass filter.
//!
//! `y[i] = α · (y[i−1] + x[i] − x[i−1])`, `α = RC / (RC + dt)`.
//!
//! The first sample after construction or [`reset`](HighPassFilter::reset)
//! passes through unchanged, which seeds `x[−1]` and `y[−1]`.

use core::f32::consts::PI;

/// Per-channel filter state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HighPassFilter {
    alpha: f32,
    last_in: f32,
    last_out: f32,
    primed: bool,
}

impl HighPassFilter {
    /// Filter with corner `cutoff_hz` at `sample_rate_hz`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Safety: audio rates are far below 2^24
    #[allow(clippy::arithmetic_side_effects)] // Safety: f32 only
    pub fn new(cutoff_hz: f32, sample_rate_hz: u32) -> Self {
        let rc = 1.0 / (cutoff_hz * 2.0 * PI);
        let dt = 1.0 / sample_rate_hz as f32;
        Self::with_alpha(rc / (rc + dt))
    }

    /// Filter with an explicit smoothing coefficient.
    #[must_use]
    pub const fn with_alpha(alpha: f32) -> Self {
        Self {
            alpha,
            last_in: 0.0,
            last_out: 0.0,
            primed: false,
        }
    }

    /// Smoothing coefficient.
    #[must_use]
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Filter one sample.
    #[allow(clippy::arithmetic_side_effects)] // Safety: f32 only
    pub fn step(&mut self, x: f32) -> f32 {
        let y = if self.primed {
            self.alpha * (self.last_out + x - self.last_in)
        } else {
            self.primed = true;
            x
        };
        self.last_in = x;
        self.last_out = y;
        y
    }

    /// Filter `samples` in place, saturating to `i16`.
    #[allow(clippy::cast_possible_truncation)] // Safety: float → int `as` saturates
    pub fn process(&mut self, samples: &mut [i16]) {
        for s in samples.iter_mut() {
            *s = self.step(f32::from(*s)) as i16;
        }
    }

    /// Forget history; the next sample passes through.
    pub fn reset(&mut self) {
        *self = Self::with_alpha(self.alpha);
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_passes_through() {
        let mut hpf = HighPassFilter::new(60.0, 16_000);
        assert!((hpf.step(1234.0) - 1234.0).abs() < f32::EPSILON);
    }

    #[test]
    fn alpha_matches_60hz_at_16khz() {
        let hpf = HighPassFilter::new(60.0, 16_000);
        assert!((hpf.alpha() - 0.976_98).abs() < 1e-4);
    }

    #[test]
    fn dc_decays_towards_zero() {
        let mut hpf = HighPassFilter::new(60.0, 16_000);
        let mut frame = [1000i16; 160];
        for _ in 0..20 {
            frame = [1000i16; 160];
            hpf.process(&mut frame);
        }
        assert!(frame.iter().all(|&s| s.abs() < 10));
    }

    #[test]
    fn state_carries_across_frames() {
        let mut whole = HighPassFilter::new(60.0, 16_000);
        let mut split = whole;
        let input: [i16; 8] = [100, -200, 300, 50, 0, -1000, 700, 20];

        let mut a = input;
        whole.process(&mut a);

        let mut b = input;
        let (left, right) = b.split_at_mut(3);
        split.process(left);
        split.process(right);

        assert_eq!(a, b);
    }

    #[test]
    fn reset_reprimes() {
        let mut hpf = HighPassFilter::new(60.0, 16_000);
        hpf.step(500.0);
        hpf.step(-500.0);
        hpf.reset();
        assert!((hpf.step(42.0) - 42.0).abs() < f32::EPSILON);
    }

    #[test]
    fn output_saturates() {
        let mut hpf = HighPassFilter::with_alpha(1.5);
        let mut frame = [0, 30_000, -30_000, 30_000];
        hpf.process(&mut frame);
        assert_eq!(frame[1], i16::MAX);
        assert_eq!(frame[3], i16::MAX);
    }
}
