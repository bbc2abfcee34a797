//! Capture-to-playback delay compensation.
//!
//! When a playback session starts, the time since the last mic capture
//! event decides how many silent samples precede the first chunk in the
//! ring, so that reading one frame per capture event stays aligned with
//! what the speaker is playing.
//!
//! ```text
//! delay_us    = ticks × 200 / 24 + 2070
//! delay_bytes = delay_us × 96 / 1000, rounded down to a multiple of 4
//! padding     = min(delay_bytes, 1356)
//! ```
//!
//! Rounding to 4 bytes keeps differential pairs (two `i16`) intact.

use platform::mic_config::{
    AMP_BYTES_PER_MS, GPT_CLOCK_MHZ, GPT_PRESCALER, LOOPBACK_CONST_DELAY_US,
    LOOPBACK_MAX_DELAY_BYTES, PCM_SAMPLE_BYTES,
};

/// Padding granularity in bytes (one differential pair).
pub const PADDING_ALIGN_BYTES: usize = 4;

/// Largest padding, rounded to [`PADDING_ALIGN_BYTES`].
#[allow(clippy::arithmetic_side_effects)] // Safety: const-evaluated, non-zero divisor
pub const MAX_PADDING_BYTES: usize =
    LOOPBACK_MAX_DELAY_BYTES - LOOPBACK_MAX_DELAY_BYTES % PADDING_ALIGN_BYTES;

/// Ticks elapsed from `then` to `now` on the wrapping timestamp counter.
///
/// `now == then` is read as a full wrap.
#[allow(clippy::arithmetic_side_effects)] // Safety: now > then in the first arm; u32::MAX - then + now <= u32::MAX in the second
pub fn tick_delta(now: u32, then: u32) -> u32 {
    if now > then {
        now - then
    } else {
        (u32::MAX - then) + now
    }
}

/// Timestamp ticks to microseconds.
#[allow(clippy::arithmetic_side_effects)] // Safety: u32 × 200 fits u64; divisor is a non-zero constant
pub fn ticks_to_us(ticks: u32) -> u64 {
    u64::from(ticks) * GPT_PRESCALER / GPT_CLOCK_MHZ
}

/// Silence to write ahead of the first chunk of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Padding {
    /// Bytes of silence, a multiple of [`PADDING_ALIGN_BYTES`].
    pub bytes: usize,
    /// Bytes cut off by the clamp. Non-zero means the ring cannot hold the
    /// real delay and the echo reference will lead the capture.
    pub clamped: usize,
}

impl Padding {
    /// Padding for a measured delay of `var_us` on top of the constant path.
    #[allow(clippy::arithmetic_side_effects)] // Safety: saturating add, u64 product of a µs count and 96, non-zero divisors
    #[allow(clippy::cast_possible_truncation)] // Safety: clamped to MAX_PADDING_BYTES before narrowing
    pub fn for_delay_us(var_us: u64) -> Self {
        let delay_us = var_us.saturating_add(u64::from(LOOPBACK_CONST_DELAY_US));
        let raw = delay_us.saturating_mul(AMP_BYTES_PER_MS as u64) / 1000;
        let aligned = raw - raw % PADDING_ALIGN_BYTES as u64;
        let max = MAX_PADDING_BYTES as u64;
        if aligned > max {
            Self {
                bytes: MAX_PADDING_BYTES,
                clamped: (aligned - max).min(usize::MAX as u64) as usize,
            }
        } else {
            Self {
                bytes: aligned as usize,
                clamped: 0,
            }
        }
    }

    /// Padding for a session starting at `now` after a capture at `capture_tick`.
    pub fn between(now: u32, capture_tick: u32) -> Self {
        Self::for_delay_us(ticks_to_us(tick_delta(now, capture_tick)))
    }

    /// Padding in `i16` samples.
    #[allow(clippy::arithmetic_side_effects)] // Safety: non-zero constant divisor
    pub fn samples(&self) -> usize {
        self.bytes / PCM_SAMPLE_BYTES
    }

    /// `true` when the measured delay exceeded the ring's headroom.
    pub fn is_clamped(&self) -> bool {
        self.clamped > 0
    }
}
