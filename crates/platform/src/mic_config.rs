//! Microphone capture and loopback configuration.
//!
//! # Frame Geometry
//!
//! Every capture period is one 10 ms frame. Microphones and the echo
//! reference meet at the 16 kHz PCM rate:
//!
//! ```text
//! mic PCM         16 kHz × 10 ms = 160 samples / channel
//! I2S raw         160 slots / channel, 2 or 4 bytes each
//! PDM raw         2.048 MHz bit clock → 4 × u32 words per PCM sample
//! amplifier feed  48 kHz × 10 ms = 480 samples (differential pairs)
//! ```
//!
//! # Loopback Sizing
//!
//! | Quantity                 | Value                          |
//! |--------------------------|--------------------------------|
//! | amplifier bytes per ms   | 480 × 2 / 10 = 96              |
//! | constant path delay      | 2070 µs → 198 bytes            |
//! | max variable delay       | 12070 µs → 1158 bytes          |
//! | ring capacity            | 4 slots × 20 ms + 1356 = 9036  |
//!
//! # Timestamp Clock
//!
//! GPT at 24 MHz with prescaler 200: one tick = 200 / 24 µs ≈ 8.33 µs.

use heapless::Vec;
use thiserror_no_std::Error;

use crate::audio_types::{ChannelMask, SampleWidth};

// ── Microphone side ──────────────────────────────────────────────────────────

/// Microphone PCM output rate.
pub const PCM_SAMPLE_RATE_HZ: u32 = 16_000;

/// PCM samples per channel in one 10 ms frame.
pub const FRAME_SAMPLES: usize = 160;

/// Bytes per converted PCM sample.
pub const PCM_SAMPLE_BYTES: usize = 2;

/// Upper bound on microphones across all capture groups.
pub const MAX_MICS: usize = 4;

/// Upper bound on capture peripherals driven by one mic task.
pub const MAX_CAPTURE_GROUPS: usize = 2;

/// Frames dropped after every (re)start before data is trusted.
pub const DISCARD_FRAMES: u8 = 4;

/// Fixed-point amplification applied to I2S samples before filtering.
pub const I2S_GAIN: i32 = 6;

/// `u32` PDM words per output PCM sample (2.048 MHz / 16 kHz / 32 bits).
pub const PDM_OVERSAMPLE_WORDS: usize = 4;

/// Gain of the scratch PDM decimator.
pub const PDM_SCRATCH_GAIN: i32 = 4;

/// Gain of the precision PDM decimator, applied to its normalized output.
pub const PDM_PRECISION_GAIN: f32 = 10.0;

/// Bytes reserved for decimator working state.
pub const DECIMATOR_WORKSPACE_BYTES: usize = 2_900;

/// High-pass filter corner for the I2S path.
pub const HPF_CUTOFF_HZ: f32 = 60.0;

/// Ready-bit wait for I2S sources.
pub const I2S_EVENT_TIMEOUT_MS: u32 = 1_000;

/// Ready-bit wait for PDM sources.
pub const PDM_EVENT_TIMEOUT_MS: u32 = 500;

/// Timeouts tolerated before a stall recovery.
pub const STALL_RETRY_BUDGET: u8 = 1;

/// Receiver-enable polls in `stop()` before giving up.
pub const STOP_POLL_LIMIT: u32 = 1_000;

// ── Amplifier / loopback side ────────────────────────────────────────────────

/// Amplifier feed rate.
pub const PCM_AMP_SAMPLE_RATE_HZ: u32 = 48_000;

/// Amplifier samples (including differential partners) in 10 ms.
pub const PCM_AMP_SAMPLE_COUNT: usize = FRAME_SAMPLES * 3;

/// Amplifier bytes per millisecond.
pub const AMP_BYTES_PER_MS: usize = PCM_AMP_SAMPLE_COUNT * PCM_SAMPLE_BYTES / 10;

/// Amplifier bytes in one mic frame.
pub const AMP_BYTES_10_MS: usize = AMP_BYTES_PER_MS * 10;

/// Amplifier bytes in one playback slot.
pub const AMP_BYTES_20_MS: usize = AMP_BYTES_PER_MS * 20;

/// Transfers the amplifier may have in flight.
pub const AMP_WRITE_SLOTS: usize = 4;

/// Fixed capture-to-playback path delay.
pub const LOOPBACK_CONST_DELAY_US: u32 = 2_070;

/// Largest variable delay the ring is sized for.
pub const LOOPBACK_MAX_VAR_DELAY_US: u32 = 12_070;

/// Bytes of the constant delay.
#[allow(clippy::arithmetic_side_effects)] // Safety: const-evaluated, 2070 * 96 fits usize
pub const LOOPBACK_CONST_DELAY_BYTES: usize =
    LOOPBACK_CONST_DELAY_US as usize * AMP_BYTES_PER_MS / 1000;

/// Bytes of the maximum variable delay.
#[allow(clippy::arithmetic_side_effects)] // Safety: const-evaluated, 12070 * 96 fits usize
pub const LOOPBACK_MAX_VAR_DELAY_BYTES: usize =
    LOOPBACK_MAX_VAR_DELAY_US as usize * AMP_BYTES_PER_MS / 1000;

/// Largest padding ever written ahead of a playback session.
#[allow(clippy::arithmetic_side_effects)] // Safety: const-evaluated
pub const LOOPBACK_MAX_DELAY_BYTES: usize =
    LOOPBACK_CONST_DELAY_BYTES + LOOPBACK_MAX_VAR_DELAY_BYTES;

/// Loopback ring capacity.
#[allow(clippy::arithmetic_side_effects)] // Safety: const-evaluated
pub const LOOPBACK_RING_BYTES: usize = AMP_WRITE_SLOTS * AMP_BYTES_20_MS + LOOPBACK_MAX_DELAY_BYTES;

/// Settle time before a fresh loopback sync.
pub const LOOPBACK_START_DELAY_MS: u64 = 15;

/// Upper bound on waiting for in-flight slots to drain before a sync.
pub const LOOPBACK_SYNC_MAX_WAIT_MS: u64 = 100;

/// Silent echo frames emitted after the ring runs dry.
pub const ECHO_SILENCE_FRAMES: u8 = 2;

/// Timestamp timer input clock.
pub const GPT_CLOCK_MHZ: u64 = 24;

/// Timestamp timer prescaler.
pub const GPT_PRESCALER: u64 = 200;

// ── Runtime configuration ────────────────────────────────────────────────────

/// Kind of microphone front end feeding a capture peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MicSource {
    /// Multiplexed PCM slots, one lane per microphone.
    I2s {
        /// Slot width read by DMA.
        width: SampleWidth,
    },
    /// 1-bit PDM packed into 32-bit words, one lane per microphone.
    Pdm,
}

impl MicSource {
    /// Width of one DMA element.
    #[must_use]
    pub fn raw_width(self) -> SampleWidth {
        match self {
            Self::I2s { width } => width,
            Self::Pdm => SampleWidth::Bytes4,
        }
    }

    /// DMA elements per lane in one frame.
    #[must_use]
    #[allow(clippy::arithmetic_side_effects)] // Safety: constant product, 640
    pub fn raw_samples_per_frame(self) -> usize {
        match self {
            Self::I2s { .. } => FRAME_SAMPLES,
            Self::Pdm => FRAME_SAMPLES * PDM_OVERSAMPLE_WORDS,
        }
    }

    /// Default ready-bit timeout for this front end.
    #[must_use]
    pub fn default_timeout_ms(self) -> u32 {
        match self {
            Self::I2s { .. } => I2S_EVENT_TIMEOUT_MS,
            Self::Pdm => PDM_EVENT_TIMEOUT_MS,
        }
    }
}

/// Errors from [`MicConfig::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MicConfigError {
    /// No capture group configured.
    #[error("no capture group configured")]
    NoGroups,
    /// Groups together enable more microphones than the PCM frame holds.
    #[error("{count} microphones configured, at most {max} supported")]
    TooManyMics {
        /// Microphones requested.
        count: usize,
        /// Supported maximum.
        max: usize,
    },
    /// A zero timeout would spin the mic task.
    #[error("event timeout must be non-zero")]
    ZeroTimeout,
}

/// Runtime capture configuration, fixed at mic task construction.
///
/// | Field            | I2S default | PDM default |
/// |------------------|-------------|-------------|
/// | `event_timeout_ms` | 1000      | 500         |
/// | `retry_budget`     | 1         | 1           |
/// | `discard_frames`   | 4         | 4           |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicConfig {
    /// Microphone front end.
    pub source: MicSource,
    /// Enabled lanes per capture peripheral, in PCM channel order.
    pub groups: Vec<ChannelMask, MAX_CAPTURE_GROUPS>,
    /// Bounded wait for the next ready event.
    pub event_timeout_ms: u32,
    /// Timeouts tolerated before stop+start.
    pub retry_budget: u8,
    /// Completions ignored after each start.
    pub discard_frames: u8,
    /// Receiver-enable polls in `stop()`.
    pub stop_poll_limit: u32,
}

impl MicConfig {
    /// Build a configuration with default timing for `source`.
    #[must_use]
    pub fn new(source: MicSource) -> Self {
        Self {
            source,
            groups: Vec::new(),
            event_timeout_ms: source.default_timeout_ms(),
            retry_budget: STALL_RETRY_BUDGET,
            discard_frames: DISCARD_FRAMES,
            stop_poll_limit: STOP_POLL_LIMIT,
        }
    }

    /// Two microphones on lanes 0 and 1 of one I2S receiver, 32-bit slots.
    #[must_use]
    pub fn i2s_dual() -> Self {
        let mut config = Self::new(MicSource::I2s {
            width: SampleWidth::Bytes4,
        });
        // Capacity is MAX_CAPTURE_GROUPS >= 1.
        let _ = config.groups.push(ChannelMask::PAIR_01);
        config
    }

    /// Three PDM microphones: lanes 0–1 on the first peripheral, lane 0 on the second.
    #[must_use]
    pub fn pdm_triple() -> Self {
        let mut config = Self::new(MicSource::Pdm);
        let _ = config.groups.push(ChannelMask::PAIR_01);
        if let Ok(single) = ChannelMask::try_new(0b0001) {
            let _ = config.groups.push(single);
        }
        config
    }

    /// Microphones across every group.
    #[must_use]
    pub fn total_mics(&self) -> usize {
        self.groups.iter().map(|g| g.count()).sum()
    }

    /// PCM channel index of the first microphone in group `group`.
    #[must_use]
    pub fn channel_offset(&self, group: usize) -> usize {
        self.groups.iter().take(group).map(|g| g.count()).sum()
    }

    /// Raw bytes one group writes per frame.
    #[must_use]
    #[allow(clippy::arithmetic_side_effects)] // Safety: <= 640 × 4 × 4 bytes
    pub fn raw_frame_bytes(&self, mask: ChannelMask) -> usize {
        self.source.raw_samples_per_frame() * mask.count() * self.source.raw_width().bytes()
    }

    /// Check the configuration before any hardware is touched.
    ///
    /// # Errors
    ///
    /// See [`MicConfigError`].
    pub fn validate(&self) -> Result<(), MicConfigError> {
        if self.groups.is_empty() {
            return Err(MicConfigError::NoGroups);
        }
        let count = self.total_mics();
        if count > MAX_MICS {
            return Err(MicConfigError::TooManyMics {
                count,
                max: MAX_MICS,
            });
        }
        if self.event_timeout_ms == 0 {
            return Err(MicConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn loopback_sizes_match_table() {
        assert_eq!(AMP_BYTES_PER_MS, 96);
        assert_eq!(AMP_BYTES_10_MS, 960);
        assert_eq!(LOOPBACK_CONST_DELAY_BYTES, 198);
        assert_eq!(LOOPBACK_MAX_VAR_DELAY_BYTES, 1158);
        assert_eq!(LOOPBACK_MAX_DELAY_BYTES, 1356);
        assert_eq!(LOOPBACK_RING_BYTES, 9036);
    }

    #[test]
    fn i2s_dual_is_valid() {
        let config = MicConfig::i2s_dual();
        config.validate().unwrap();
        assert_eq!(config.total_mics(), 2);
        assert_eq!(config.event_timeout_ms, 1_000);
        assert_eq!(config.raw_frame_bytes(ChannelMask::PAIR_01), 160 * 2 * 4);
    }

    #[test]
    fn pdm_triple_offsets_second_group() {
        let config = MicConfig::pdm_triple();
        config.validate().unwrap();
        assert_eq!(config.total_mics(), 3);
        assert_eq!(config.channel_offset(0), 0);
        assert_eq!(config.channel_offset(1), 2);
        assert_eq!(config.event_timeout_ms, 500);
    }

    #[test]
    fn empty_groups_rejected() {
        let config = MicConfig::new(MicSource::Pdm);
        assert_eq!(config.validate(), Err(MicConfigError::NoGroups));
    }

    #[test]
    fn too_many_mics_rejected() {
        let mut config = MicConfig::new(MicSource::Pdm);
        let all = ChannelMask::try_new(0x0F).unwrap();
        config.groups.push(all).unwrap();
        config.groups.push(ChannelMask::PAIR_01).unwrap();
        assert_eq!(
            config.validate(),
            Err(MicConfigError::TooManyMics { count: 6, max: 4 })
        );
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut config = MicConfig::i2s_dual();
        config.event_timeout_ms = 0;
        assert_eq!(config.validate(), Err(MicConfigError::ZeroTimeout));
    }
}
