//! Ping/pong buffer pairs shared between DMA, the mic task and the consumer.
//!
//! # Ownership model
//!
//! A `PingPong` is a `static`. Each half has exactly one writer at a time:
//!
//! ```text
//!             raw capture                       PCM / echo
//! writer      DMA engine                        mic task
//! reader      mic task, after the ready bit     processing task, after notify
//! ```
//!
//! The ready bit (raw) or the frame-ready notification (PCM) is what hands
//! a half from writer to reader. Nothing in the type system can see that
//! handoff, so half accessors are `unsafe` and callers state which side of
//! the protocol they hold.

use core::cell::UnsafeCell;

use platform::audio_types::Phase;
use platform::dma::DmaTarget;
use platform::mic_config::{FRAME_SAMPLES, MAX_MICS};

/// PCM samples per half: every channel, channel-major.
#[allow(clippy::arithmetic_side_effects)] // Safety: constant product, 640
pub const PCM_FRAME_SAMPLES: usize = FRAME_SAMPLES * MAX_MICS;

/// Raw capture buffer of one group, `N` bytes per half.
///
/// `N` should be a multiple of 32 so the pong half is cache-line aligned too.
pub type RawBuffer<const N: usize> = PingPong<u8, N>;

/// Converted microphone PCM.
pub type PcmBuffer = PingPong<i16, PCM_FRAME_SAMPLES>;

/// Echo reference aligned with [`PcmBuffer`].
pub type EchoBuffer = PingPong<i16, FRAME_SAMPLES>;

/// Two equally sized halves, cache-line aligned for DMA.
#[repr(C, align(32))]
pub struct PingPong<T, const N: usize> {
    halves: [UnsafeCell<[T; N]>; 2],
}

// SAFETY: access to each half is serialized by the ready-bit / notify
// protocol described in the module docs; the type itself holds no pointers.
unsafe impl<T: Send, const N: usize> Sync for PingPong<T, N> {}

impl<T: Copy, const N: usize> PingPong<T, N> {
    /// Both halves filled with `fill`.
    pub const fn new(fill: T) -> Self {
        Self {
            halves: [UnsafeCell::new([fill; N]), UnsafeCell::new([fill; N])],
        }
    }

    /// Elements per half.
    pub const fn half_len(&self) -> usize {
        N
    }

    /// Shared view of one half.
    ///
    /// # Safety
    ///
    /// No writer (DMA or task) may be active on `phase` for the lifetime of
    /// the returned reference.
    pub unsafe fn half(&self, phase: Phase) -> &[T; N] {
        let cell = match phase {
            Phase::Ping => &self.halves[0],
            Phase::Pong => &self.halves[1],
        };
        // SAFETY: caller guarantees no concurrent writer on this half.
        unsafe { &*cell.get() }
    }

    /// Exclusive view of one half.
    ///
    /// # Safety
    ///
    /// The caller must be the only accessor of `phase` (no DMA, no reader)
    /// for the lifetime of the returned reference.
    #[allow(clippy::mut_from_ref)] // exclusivity comes from the handoff protocol, not &mut self
    pub unsafe fn half_mut(&self, phase: Phase) -> &mut [T; N] {
        let cell = match phase {
            Phase::Ping => &self.halves[0],
            Phase::Pong => &self.halves[1],
        };
        // SAFETY: caller guarantees exclusive access to this half.
        unsafe { &mut *cell.get() }
    }

    /// Overwrite both halves with `value`.
    ///
    /// # Safety
    ///
    /// Capture must be stopped and no consumer may hold either half.
    pub unsafe fn fill(&self, value: T) {
        for phase in Phase::ALL {
            // SAFETY: forwarded from the caller.
            unsafe { self.half_mut(phase) }.fill(value);
        }
    }

    /// DMA destinations for the ping and pong descriptors.
    #[allow(clippy::arithmetic_side_effects)] // Safety: N * size_of::<T>() is the size of a live array
    pub fn dma_targets(&self) -> [DmaTarget; 2] {
        let bytes = N * core::mem::size_of::<T>();
        [
            DmaTarget {
                addr: self.halves[0].get().cast::<u8>(),
                len: bytes,
            },
            DmaTarget {
                addr: self.halves[1].get().cast::<u8>(),
                len: bytes,
            },
        ]
    }
}
