//! Amplifier sample preparation.
//!
//! The amplifier is driven with differential pairs: every even sample is
//! followed by its negation. Before a chunk is sent, each pair is scaled
//! by the playback volume, re-encoded differentially, then smoothed by a
//! 31-tap symmetric low-pass FIR running on the even samples. The FIR
//! delay line persists across chunks.

use platform::audio_types::VolumePercent;

/// FIR taps, Q15.
pub const FIR_COEFFICIENTS: [i32; 31] = [
    -17, -6, 62, -145, 190, -104, -179, 613, -991, 982, -262, -1303, 3520, -5871, 7672, 31653,
    7672, -5871, 3520, -1303, -262, 982, -991, 613, -179, -104, 190, -145, 62, -6, -17,
];

/// Delay-line length.
pub const FIR_DELAY_LEN: usize = 32;

/// Tap pairs `(k, 30 − k)` that contribute to the output. Taps at multiples
/// of three do not.
const SYMMETRIC_TAPS: [usize; 10] = [1, 2, 4, 5, 7, 8, 10, 11, 13, 14];

/// Center tap.
const CENTER_TAP: usize = 15;

/// Scale every pair by `volume` and rewrite its odd sample as the negated
/// even one. A trailing unpaired sample is left alone.
pub fn apply_volume_differential(samples: &mut [i16], volume: VolumePercent) {
    for pair in samples.chunks_exact_mut(2) {
        let [even, odd] = pair else {
            continue;
        };
        *even = volume.scale(*even);
        *odd = even.saturating_neg();
    }
}

/// Persistent low-pass filter over the even samples of differential pairs.
#[derive(Debug, Clone)]
pub struct FirLowPass {
    delay: [i16; FIR_DELAY_LEN],
}

impl FirLowPass {
    /// Filter with an all-zero delay line.
    pub const fn new() -> Self {
        Self {
            delay: [0; FIR_DELAY_LEN],
        }
    }

    /// Zero the delay line.
    pub fn reset(&mut self) {
        self.delay = [0; FIR_DELAY_LEN];
    }

    /// Filter `samples` in place, pair by pair.
    ///
    /// Each pair's even sample enters the delay line, the output replaces
    /// it and the odd sample becomes its negation.
    pub fn process(&mut self, samples: &mut [i16]) {
        for pair in samples.chunks_exact_mut(2) {
            let [even, odd] = pair else {
                continue;
            };
            let filtered = self.step(*even);
            *even = filtered;
            *odd = filtered.saturating_neg();
        }
    }

    #[allow(clippy::arithmetic_side_effects)] // Safety: i64 accumulation of 21 products of |i16 + i16| × |coef| < 2^32
    #[allow(clippy::cast_possible_truncation)] // Safety: clamped to the i16 range before narrowing
    fn step(&mut self, input: i16) -> i16 {
        if let Some(head) = self.delay.first_mut() {
            *head = input;
        }
        let tap = |k: usize| i64::from(self.delay.get(k).copied().unwrap_or(0));
        let coef = |k: usize| i64::from(FIR_COEFFICIENTS.get(k).copied().unwrap_or(0));

        let mut acc: i64 = SYMMETRIC_TAPS
            .iter()
            .map(|&k| coef(k) * (tap(k) + tap(30 - k)))
            .sum();
        acc += coef(CENTER_TAP) * tap(CENTER_TAP);

        self.delay.copy_within(..FIR_DELAY_LEN - 1, 1);

        (acc >> 15).clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16
    }
}

impl Default for FirLowPass {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use super::*;

    #[test]
    fn volume_and_negation() {
        let mut chunk = [1000, 5, -400, 5, 7];
        apply_volume_differential(&mut chunk, VolumePercent::new(50));
        assert_eq!(chunk, [500, -500, -200, 200, 7]);
    }

    #[test]
    fn negating_min_saturates() {
        let mut chunk = [i16::MIN, 0];
        apply_volume_differential(&mut chunk, VolumePercent::FULL);
        assert_eq!(chunk, [i16::MIN, i16::MAX]);
    }

    #[test]
    fn impulse_walks_through_contributing_taps() {
        let mut fir = FirLowPass::new();
        let mut chunk = [0i16; 64];
        chunk[0] = i16::MAX;
        fir.process(&mut chunk);

        // The new sample sits at delay[0] during its own step and moves to
        // delay[k] k steps later.
        assert_eq!(chunk[0], 0);
        for k in 1..31usize {
            let expected = if k % 3 == 0 && k != CENTER_TAP {
                0
            } else {
                ((i64::from(FIR_COEFFICIENTS[k]) * i64::from(i16::MAX)) >> 15) as i16
            };
            assert_eq!(chunk[2 * k], expected, "tap {k}");
            assert_eq!(chunk[2 * k + 1], expected.saturating_neg());
        }
    }

    #[test]
    fn state_persists_across_chunks() {
        let mut whole = FirLowPass::new();
        let mut split = FirLowPass::new();
        let signal: [i16; 96] = core::array::from_fn(|i| ((i * 977) % 20_000) as i16 - 10_000);

        let mut a = signal;
        whole.process(&mut a);

        let mut b = signal;
        let (first, second) = b.split_at_mut(32);
        split.process(first);
        split.process(second);

        assert_eq!(a, b);
    }

    #[test]
    fn dc_settles_at_contributing_tap_sum() {
        let mut fir = FirLowPass::new();
        let mut chunk = [0i16; 128];
        for pair in chunk.chunks_exact_mut(2) {
            pair[0] = 8_000;
        }
        fir.process(&mut chunk);

        let gain: i64 = SYMMETRIC_TAPS
            .iter()
            .map(|&k| 2 * i64::from(FIR_COEFFICIENTS[k]))
            .sum::<i64>()
            + i64::from(FIR_COEFFICIENTS[CENTER_TAP]);
        assert_eq!(gain, 27_919);
        assert_eq!(chunk[126], 6_816);
        assert_eq!(chunk[127], -6_816);
    }

    #[test]
    fn reset_clears_history() {
        let mut fir = FirLowPass::new();
        let mut chunk = [20_000i16; 16];
        fir.process(&mut chunk);
        fir.reset();
        let mut silent = [0i16; 16];
        fir.process(&mut silent);
        assert!(silent.iter().all(|&s| s == 0));
    }
}
