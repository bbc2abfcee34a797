//! Capture-side collaborator traits.
//!
//! The mic pipeline touches the outside world through four seams:
//!
//! | Trait                    | Implemented by                       |
//! |--------------------------|--------------------------------------|
//! | [`CaptureHardware`]      | SAI/PDM receiver + eDMA driver       |
//! | [`CompletionAck`]        | same driver, interrupt half          |
//! | [`FrameSink`]            | downstream audio processing task     |
//! | [`EchoReferenceSource`]  | amplifier loopback                   |
//!
//! Register programming lives behind these traits so the pipeline runs
//! unchanged against `mocks` on the host.

use crate::audio_types::Phase;
use crate::dma::{DmaLayout, DmaTarget};

/// Flags reported when a completion interrupt is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CompletionFlags {
    /// The channel latched a transfer error alongside completion.
    pub error: bool,
}

/// Task-side control of one capture peripheral and its DMA channel.
pub trait CaptureHardware {
    /// Program both scatter-gather descriptors. Called with the receiver off.
    fn install(&mut self, layout: &DmaLayout, targets: [DmaTarget; 2]);

    /// Enable the DMA request and the receiver.
    fn enable(&mut self);

    /// Clear receiver enable. Hardware acknowledges on its own time.
    fn request_disable(&mut self);

    /// `true` while the receiver still reports itself enabled.
    fn is_receiver_active(&self) -> bool;

    /// Reset FIFO pointers, clear the DMA request and reset the channel.
    fn reset(&mut self);
}

/// Interrupt-side acknowledgment of a completed half-buffer.
pub trait CompletionAck {
    /// Clear interrupt and done flags and re-arm the next descriptor.
    fn acknowledge(&mut self) -> CompletionFlags;
}

/// Receiver of phase-tagged "frame ready" notifications.
pub trait FrameSink {
    /// PCM half `phase` is complete for every capture group.
    fn notify(&self, phase: Phase);
}

impl<T: FrameSink + ?Sized> FrameSink for &T {
    fn notify(&self, phase: Phase) {
        (**self).notify(phase);
    }
}

/// Provider of the time-aligned echo reference for one mic frame.
pub trait EchoReferenceSource {
    /// Fill `out` with the reference aligned to the capture at `capture_tick`.
    async fn fetch(&self, out: &mut [i16], capture_tick: u32);

    /// Capture is on; start accepting playback data.
    async fn enable(&self);

    /// Capture is off; drop buffered playback data.
    async fn disable(&self);
}

impl<T: EchoReferenceSource + ?Sized> EchoReferenceSource for &T {
    async fn fetch(&self, out: &mut [i16], capture_tick: u32) {
        (**self).fetch(out, capture_tick).await;
    }

    async fn enable(&self) {
        (**self).enable().await;
    }

    async fn disable(&self) {
        (**self).disable().await;
    }
}

/// Echo source for builds without an amplifier; leaves `out` untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEchoReference;

impl EchoReferenceSource for NoEchoReference {
    async fn fetch(&self, _out: &mut [i16], _capture_tick: u32) {}

    async fn enable(&self) {}

    async fn disable(&self) {}
}
