//! Playback path: prepares amplifier chunks, keeps the echo reference in
//! step with them and feeds the transmit DMA.
//!
//! # Per chunk
//!
//! ```text
//! cap + round to 32 bytes ─► volume + differential ─► FIR low-pass
//!        │
//!        ├─ loopback NeedSync? ─► settle 15 ms ─► drain ≤ 100 ms ─► Enabled
//!        │
//!        └─► take slot ─► AmpOutput::transfer ─► Loopback::write_chunk
//! ```
//!
//! The feeder runs in a lower-priority task than the mic task. It may wait
//! on the loopback mutex and on the slot pool; the mic task never waits on
//! the feeder.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{with_timeout, Duration, Timer};
use loopback::{
    apply_volume_differential, ChunkOutcome, FirLowPass, Loopback, LoopbackError, LoopbackState,
};
use platform::amp::AmpOutput;
use platform::audio_types::VolumePercent;
use platform::clock::TickSource;
use platform::mic_config::{
    AMP_BYTES_20_MS, LOOPBACK_START_DELAY_MS, LOOPBACK_SYNC_MAX_WAIT_MS, PCM_SAMPLE_BYTES,
};
use thiserror_no_std::Error;

use super::slots::AmpSlots;

/// Largest chunk handed to the transmit DMA in one transfer, in bytes.
pub const MAX_CHUNK_BYTES: usize = 0x8_0000;

/// Transfer sizes are rounded down to this many bytes.
pub const CHUNK_ALIGN_BYTES: usize = 32;

/// Samples per playback slot (20 ms at 48 kHz).
#[allow(clippy::arithmetic_side_effects)] // Safety: const-evaluated, non-zero divisor
pub const SLOT_SAMPLES: usize = AMP_BYTES_20_MS / PCM_SAMPLE_BYTES;

/// Errors from the playback path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FeedError<E: core::fmt::Debug> {
    /// The amplifier driver rejected a transfer.
    #[error("amplifier transfer failed: {0:?}")]
    Transfer(E),
    /// Playback was aborted through [`AmpSlots::request_abort`].
    #[error("playback aborted")]
    Aborted,
}

/// What happened to one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    /// Rounding left nothing to play.
    Empty,
    /// Played; `mirror` says how the loopback took it.
    Sent {
        /// Samples transferred.
        samples: usize,
        /// Loopback side of the chunk.
        mirror: ChunkOutcome,
    },
    /// Played, but the loopback ring could not take it.
    Unmirrored {
        /// Samples transferred.
        samples: usize,
        /// Why the loopback skipped it.
        reason: LoopbackError,
    },
}

/// Counters kept by the feeder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeedStats {
    /// Chunks transferred.
    pub chunks: u32,
    /// Chunks dropped because rounding emptied them.
    pub empty: u32,
    /// Syncs whose drain wait timed out.
    pub drain_timeouts: u32,
    /// Chunks the loopback could not mirror.
    pub unmirrored: u32,
}

/// Transfer length for a chunk of `len` samples: capped at
/// [`MAX_CHUNK_BYTES`] and rounded down to [`CHUNK_ALIGN_BYTES`].
#[allow(clippy::arithmetic_side_effects)] // Safety: non-zero constant divisors; x - x % n never underflows
pub fn chunk_len(len: usize) -> usize {
    let bytes = len.saturating_mul(PCM_SAMPLE_BYTES).min(MAX_CHUNK_BYTES);
    let aligned = bytes - bytes % CHUNK_ALIGN_BYTES;
    aligned / PCM_SAMPLE_BYTES
}

/// Feeds the amplifier and mirrors what it plays into the loopback.
pub struct AmpFeeder<'a, A, M, T>
where
    A: AmpOutput,
    M: RawMutex,
    T: TickSource,
{
    amp: A,
    slots: &'a AmpSlots,
    loopback: &'a Loopback<M, T>,
    fir: FirLowPass,
    volume: VolumePercent,
    stats: FeedStats,
}

impl<'a, A, M, T> AmpFeeder<'a, A, M, T>
where
    A: AmpOutput,
    M: RawMutex,
    T: TickSource,
{
    /// Feeder at full volume.
    pub fn new(amp: A, slots: &'a AmpSlots, loopback: &'a Loopback<M, T>) -> Self {
        Self {
            amp,
            slots,
            loopback,
            fir: FirLowPass::new(),
            volume: VolumePercent::FULL,
            stats: FeedStats::default(),
        }
    }

    /// Volume applied to subsequent chunks.
    pub fn set_volume(&mut self, volume: VolumePercent) {
        self.volume = volume;
    }

    /// Current volume.
    pub fn volume(&self) -> VolumePercent {
        self.volume
    }

    /// Counters so far.
    pub fn stats(&self) -> FeedStats {
        self.stats
    }

    /// The amplifier driver.
    pub fn amp(&self) -> &A {
        &self.amp
    }

    /// Prepare `chunk` in place and send it.
    ///
    /// Only the leading [`chunk_len`] samples are prepared and played.
    pub async fn feed_chunk(
        &mut self,
        chunk: &mut [i16],
    ) -> Result<FeedOutcome, FeedError<A::Error>> {
        let len = chunk_len(chunk.len());
        let Some(chunk) = chunk.get_mut(..len).filter(|c| !c.is_empty()) else {
            self.stats.empty = self.stats.empty.wrapping_add(1);
            return Ok(FeedOutcome::Empty);
        };

        apply_volume_differential(chunk, self.volume);
        self.fir.process(chunk);

        if self.loopback.is_ready().await
            && self.loopback.state().await == LoopbackState::NeedSync
        {
            self.sync().await;
        }

        self.slots.acquire().await;
        if let Err(err) = self.amp.transfer(chunk).await {
            self.slots.release();
            return Err(FeedError::Transfer(err));
        }
        self.stats.chunks = self.stats.chunks.wrapping_add(1);

        match self.loopback.write_chunk(chunk).await {
            Ok(mirror) => Ok(FeedOutcome::Sent { samples: len, mirror }),
            Err(reason) => {
                self.stats.unmirrored = self.stats.unmirrored.wrapping_add(1);
                Ok(FeedOutcome::Unmirrored { samples: len, reason })
            }
        }
    }

    /// Play `data` slot by slot, then wait for the last transfer to finish.
    ///
    /// `data` is modified in place. Returns the samples played.
    ///
    /// # Errors
    ///
    /// [`FeedError::Aborted`] after [`AmpSlots::request_abort`]; the
    /// transfer error of the first failing chunk otherwise.
    pub async fn play(&mut self, data: &mut [i16]) -> Result<usize, FeedError<A::Error>> {
        let _ = self.slots.take_abort();
        let mut played = 0usize;
        for chunk in data.chunks_mut(SLOT_SAMPLES) {
            if self.slots.take_abort() {
                return Err(FeedError::Aborted);
            }
            if let FeedOutcome::Sent { samples, .. } | FeedOutcome::Unmirrored { samples, .. } =
                self.feed_chunk(chunk).await?
            {
                played = played.saturating_add(samples);
            }
        }
        self.slots.drained().await;
        Ok(played)
    }

    /// Wait for capture to settle and in-flight transfers to drain, then
    /// let the loopback start measuring from the next chunk.
    async fn sync(&mut self) {
        Timer::after(Duration::from_millis(LOOPBACK_START_DELAY_MS)).await;

        let wait = Duration::from_millis(LOOPBACK_SYNC_MAX_WAIT_MS);
        if with_timeout(wait, self.slots.drained()).await.is_err() {
            self.stats.drain_timeouts = self.stats.drain_timeouts.wrapping_add(1);
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "amp: {} slots still busy at loopback sync",
                self.slots.capacity().saturating_sub(self.slots.free())
            );
        }

        // Capture may have been switched off while waiting.
        if self.loopback.complete_sync().await.is_err() {
            #[cfg(feature = "defmt")]
            defmt::debug!("amp: loopback sync abandoned");
        }
    }
}

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn chunk_len_rounds_to_sixteen_samples() {
        assert_eq!(chunk_len(0), 0);
        assert_eq!(chunk_len(15), 0);
        assert_eq!(chunk_len(16), 16);
        assert_eq!(chunk_len(961), 960);
    }

    #[test]
    fn chunk_len_is_capped() {
        assert_eq!(chunk_len(usize::MAX), MAX_CHUNK_BYTES / 2);
        assert_eq!(chunk_len(MAX_CHUNK_BYTES), MAX_CHUNK_BYTES / 2);
    }

    #[test]
    fn slot_is_twenty_ms() {
        assert_eq!(SLOT_SAMPLES, 960);
    }
}
