//! The shared echo reference.
//!
//! [`Loopback`] sits between two tasks:
//!
//! - the playback feeder calls [`Loopback::write_chunk`] for every chunk it
//!   hands to the amplifier;
//! - the mic task calls [`EchoReferenceSource::fetch`] once per frame.
//!
//! The ring, the sync state and the last capture tick share one Embassy
//! mutex, so a fetch never observes half a chunk.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use platform::capture::EchoReferenceSource;
use platform::clock::TickSource;
use platform::mic_config::{ECHO_SILENCE_FRAMES, LOOPBACK_RING_BYTES, PCM_SAMPLE_BYTES};

use crate::delay::Padding;
use crate::downsample::{downsample_48k_to_16k, AMP_FRAME_SAMPLES};
use crate::error::LoopbackError;
use crate::ring_buffer::RingBuffer;
use crate::sync::{LoopbackState, SyncState};

/// Ring capacity in samples.
#[allow(clippy::arithmetic_side_effects)] // Safety: const-evaluated, non-zero divisor
pub const LOOPBACK_RING_SAMPLES: usize = LOOPBACK_RING_BYTES / PCM_SAMPLE_BYTES;

/// What happened to a chunk passed to [`Loopback::write_chunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChunkOutcome {
    /// No capture tick yet, or the loopback is not enabled; nothing stored.
    Bypassed,
    /// Appended behind data already in the ring.
    Appended,
    /// First chunk of a session, stored after `padding` of silence.
    Synced {
        /// Silence written ahead of the chunk.
        padding: Padding,
    },
}

/// Counters kept by the loopback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoopbackStats {
    /// Sessions whose delay exceeded the ring headroom.
    pub desyncs: u32,
    /// Chunks skipped because the ring was full.
    pub dropped_chunks: u32,
    /// Frames fetched with an empty ring.
    pub underruns: u32,
}

struct Inner {
    ring: RingBuffer<LOOPBACK_RING_SAMPLES>,
    sync: SyncState,
    capture_tick: Option<u32>,
    silence_left: u8,
    stats: LoopbackStats,
}

/// Delay-compensated echo reference shared by playback and capture.
pub struct Loopback<M: RawMutex, T: TickSource> {
    inner: Mutex<M, Inner>,
    ticks: T,
}

impl<M: RawMutex, T: TickSource> Loopback<M, T> {
    /// Empty, disabled loopback timestamped by `ticks`.
    ///
    /// The first [`ECHO_SILENCE_FRAMES`] fetches after boot return silence.
    pub const fn new(ticks: T) -> Self {
        Self {
            inner: Mutex::new(Inner {
                ring: RingBuffer::new(),
                sync: SyncState::new(),
                capture_tick: None,
                silence_left: ECHO_SILENCE_FRAMES,
                stats: LoopbackStats {
                    desyncs: 0,
                    dropped_chunks: 0,
                    underruns: 0,
                },
            }),
            ticks,
        }
    }

    /// Timestamp source.
    pub fn ticks(&self) -> &T {
        &self.ticks
    }

    /// Current sync state.
    pub async fn state(&self) -> LoopbackState {
        self.inner.lock().await.sync.state()
    }

    /// `true` once a capture tick has been recorded.
    pub async fn is_ready(&self) -> bool {
        self.inner.lock().await.capture_tick.is_some()
    }

    /// Samples currently buffered.
    pub async fn buffered(&self) -> usize {
        self.inner.lock().await.ring.available()
    }

    /// Counters so far.
    pub async fn stats(&self) -> LoopbackStats {
        self.inner.lock().await.stats
    }

    /// Finish a pending sync and start mirroring playback.
    ///
    /// # Errors
    ///
    /// [`LoopbackError::NotSyncing`] if capture was switched off, or the
    /// sync already completed, since the feeder began waiting.
    pub async fn complete_sync(&self) -> Result<(), LoopbackError> {
        let mut inner = self.inner.lock().await;
        inner.sync.complete_sync()?;
        #[cfg(feature = "defmt")]
        defmt::debug!("loopback: synced, session {}", inner.sync.sessions());
        Ok(())
    }

    /// Mirror one prepared amplifier chunk into the ring.
    ///
    /// The first chunk after the ring runs empty measures the time since
    /// the last capture event and writes that much silence ahead of it.
    ///
    /// # Errors
    ///
    /// [`LoopbackError::RingFull`] when the chunk does not fit; it is
    /// skipped and counted.
    pub async fn write_chunk(&self, samples: &[i16]) -> Result<ChunkOutcome, LoopbackError> {
        let mut inner = self.inner.lock().await;
        let Some(capture_tick) = inner.capture_tick else {
            return Ok(ChunkOutcome::Bypassed);
        };
        if !inner.sync.mirrors_playback() {
            return Ok(ChunkOutcome::Bypassed);
        }

        let outcome = if inner.ring.is_empty() {
            let padding = Padding::between(self.ticks.now(), capture_tick);
            if padding.is_clamped() {
                inner.stats.desyncs = inner.stats.desyncs.wrapping_add(1);
                #[cfg(feature = "defmt")]
                defmt::warn!("loopback: desync of {} bytes", padding.clamped);
            }
            inner.ring.write_silence(padding.samples())?;
            ChunkOutcome::Synced { padding }
        } else {
            ChunkOutcome::Appended
        };

        if let Err(err) = inner.ring.write_slice(samples) {
            inner.stats.dropped_chunks = inner.stats.dropped_chunks.wrapping_add(1);
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "loopback: chunk of {} samples skipped, {} free",
                samples.len(),
                inner.ring.free()
            );
            return Err(err);
        }
        Ok(outcome)
    }

    /// Read one echo frame aligned to the capture at `capture_tick`.
    ///
    /// Records the tick, then consumes up to one amplifier frame. A short
    /// read is zero-padded. With nothing buffered, `out` is zeroed for
    /// [`ECHO_SILENCE_FRAMES`] frames and left untouched after that.
    pub async fn read_frame(&self, out: &mut [i16], capture_tick: u32) {
        let mut amp = [0i16; AMP_FRAME_SAMPLES];
        let mut inner = self.inner.lock().await;
        inner.capture_tick = Some(capture_tick);
        let read = inner.ring.read_slice(&mut amp);

        if read > 0 {
            inner.silence_left = ECHO_SILENCE_FRAMES;
            drop(inner);
            downsample_48k_to_16k(&amp, out);
        } else if inner.silence_left > 0 {
            inner.silence_left = inner.silence_left.saturating_sub(1);
            inner.stats.underruns = inner.stats.underruns.wrapping_add(1);
            drop(inner);
            out.fill(0);
        }
    }
}

impl<M: RawMutex, T: TickSource> EchoReferenceSource for Loopback<M, T> {
    async fn fetch(&self, out: &mut [i16], capture_tick: u32) {
        self.read_frame(out, capture_tick).await;
    }

    async fn enable(&self) {
        self.inner.lock().await.sync.enable();
        #[cfg(feature = "defmt")]
        defmt::debug!("loopback: enable, waiting for sync");
    }

    async fn disable(&self) {
        let mut inner = self.inner.lock().await;
        inner.ring.clear();
        inner.sync.disable();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use platform::mocks::MockTickSource;

    type TestLoopback = Loopback<CriticalSectionRawMutex, MockTickSource>;

    #[test]
    fn ring_holds_four_slots_and_max_padding() {
        assert_eq!(LOOPBACK_RING_SAMPLES, 4_518);
    }

    #[test]
    fn chunks_bypass_before_first_capture() {
        block_on(async {
            let lb = TestLoopback::new(MockTickSource::new(0));
            lb.enable().await;
            lb.complete_sync().await.unwrap();
            assert_eq!(lb.write_chunk(&[1, -1]).await, Ok(ChunkOutcome::Bypassed));
            assert_eq!(lb.buffered().await, 0);
        });
    }

    #[test]
    fn chunks_bypass_while_waiting_for_sync() {
        block_on(async {
            let lb = TestLoopback::new(MockTickSource::new(0));
            let mut out = [0i16; 160];
            lb.fetch(&mut out, 0).await;
            lb.enable().await;
            assert_eq!(lb.state().await, LoopbackState::NeedSync);
            assert_eq!(lb.write_chunk(&[1, -1]).await, Ok(ChunkOutcome::Bypassed));
        });
    }

    #[test]
    fn boot_fetches_are_silent_then_untouched() {
        block_on(async {
            let lb = TestLoopback::new(MockTickSource::new(0));
            let mut out = [5i16; 160];
            for tick in 0..ECHO_SILENCE_FRAMES {
                out.fill(5);
                lb.fetch(&mut out, u32::from(tick)).await;
                assert!(out.iter().all(|&s| s == 0));
            }
            out.fill(5);
            lb.fetch(&mut out, 9).await;
            assert!(out.iter().all(|&s| s == 5));
            assert_eq!(lb.stats().await.underruns, u32::from(ECHO_SILENCE_FRAMES));
        });
    }

    #[test]
    fn disable_keeps_pending_silence_run() {
        block_on(async {
            let lb = TestLoopback::new(MockTickSource::new(0));
            let mut out = [5i16; 160];
            lb.fetch(&mut out, 0).await;
            lb.disable().await;
            out.fill(5);
            lb.fetch(&mut out, 1).await;
            assert!(out.iter().all(|&s| s == 0));
            out.fill(5);
            lb.fetch(&mut out, 2).await;
            assert!(out.iter().all(|&s| s == 5));
        });
    }
}
