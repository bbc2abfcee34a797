//! DMA descriptor abstraction for continuous ping/pong capture.
//!
//! A capture peripheral exposes its receive lanes as consecutive 32-bit FIFO
//! registers (`lane n` at byte offset `4n`). One DMA *minor loop* reads one
//! sample from every enabled lane; the *major loop* repeats that once per
//! sample period until a half-buffer is full, then scatter-gather swaps to
//! the other half's descriptor.
//!
//! ```text
//! FIFO window (16 bytes)      destination half (interleaved)
//! ┌────┬────┬────┬────┐       ┌────┬────┬────┬────┬────┬───
//! │ L0 │ L1 │ L2 │ L3 │  ──►  │ L0 │ L1 │ L0 │ L1 │ L0 │ …
//! └────┴────┴────┴────┘       └────┴────┴────┴────┴────┴───
//! ```
//!
//! [`DmaLayout`] captures the parameters a driver programs into both
//! descriptors. [`DmaLayout::visit_order`] replays the source address walk so
//! layouts can be checked on the host.

use crate::audio_types::SampleWidth;

/// Bytes between consecutive lane FIFO registers.
pub const LANE_STRIDE_BYTES: u32 = 4;

/// Size of the address window covering all four lanes.
pub const FIFO_WINDOW_BYTES: u32 = 16;

/// How the source address returns to the first lane after a minor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SourceWrap {
    /// Address never moves (single lane, zero stride).
    None,
    /// Signed offset added to the source address after each minor loop.
    MinorLoopOffset(i32),
    /// Only the low `log2(bytes)` address bits change.
    Modulo {
        /// Power-of-two window size in bytes.
        bytes: u32,
    },
}

/// Parameters shared by the ping and pong transfer descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DmaLayout {
    /// Source offset from the FIFO base: first lane, plus 2 for 16-bit slots.
    pub source_start: u32,
    /// Element read per source access.
    pub element: SampleWidth,
    /// Bytes per minor loop (one sample from every enabled lane).
    pub minor_loop_bytes: u32,
    /// Source increment between elements.
    pub source_stride: u32,
    /// Return path to the first lane.
    pub wrap: SourceWrap,
    /// Destination increment between elements.
    pub dest_stride: u32,
    /// Minor loops per half-buffer.
    pub major_count: u16,
}

/// One descriptor destination.
///
/// The pointer is handed to hardware; nothing on the CPU side dereferences
/// it through this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaTarget {
    /// First byte of the half-buffer.
    pub addr: *mut u8,
    /// Length of the half-buffer in bytes.
    pub len: usize,
}

impl DmaLayout {
    /// Elements read per minor loop.
    #[must_use]
    #[allow(clippy::arithmetic_side_effects)] // Safety: element width is 2 or 4, never zero
    pub fn elements_per_minor_loop(&self) -> u32 {
        self.minor_loop_bytes / self.element.bytes() as u32
    }

    /// Bytes one half-buffer receives.
    #[must_use]
    #[allow(clippy::arithmetic_side_effects)] // Safety: <= 16 × u16::MAX
    pub fn half_bytes(&self) -> usize {
        self.minor_loop_bytes as usize * usize::from(self.major_count)
    }

    /// Lanes read by one minor loop, in access order, and the source address
    /// the next minor loop starts from.
    ///
    /// Addresses are relative to the FIFO base, so lane = `(addr % 16) / 4`.
    #[must_use]
    #[allow(clippy::arithmetic_side_effects)] // Safety: wrapping_* on all address math; /,% by non-zero constants
    #[allow(clippy::cast_possible_truncation)] // Safety: lane index < 4
    #[allow(clippy::cast_sign_loss)] // Safety: wrapping add of a two's-complement offset
    pub fn visit_order(&self) -> (heapless::Vec<u8, 4>, u32) {
        let mut lanes = heapless::Vec::new();
        let mut addr = self.source_start;
        for _ in 0..self.elements_per_minor_loop() {
            let lane = ((addr % FIFO_WINDOW_BYTES) / LANE_STRIDE_BYTES) as u8;
            if lanes.push(lane).is_err() {
                break;
            }
            addr = self.advance(addr, self.source_stride);
        }
        let next = match self.wrap {
            SourceWrap::MinorLoopOffset(offset) => addr.wrapping_add(offset as u32),
            SourceWrap::None | SourceWrap::Modulo { .. } => addr,
        };
        (lanes, next)
    }

    #[allow(clippy::arithmetic_side_effects)] // Safety: modulo window is a non-zero power of two
    fn advance(&self, addr: u32, by: u32) -> u32 {
        let next = addr.wrapping_add(by);
        match self.wrap {
            SourceWrap::Modulo { bytes } if bytes != 0 => {
                (self.source_start & !(bytes - 1)) | (next & (bytes - 1))
            }
            _ => next,
        }
    }
}
