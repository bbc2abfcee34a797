//! Loopback errors.
//!
//! None of these stop playback. The feeder logs them and keeps sending
//! audio to the amplifier; only the echo reference degrades.

use thiserror_no_std::Error;

/// Errors returned by the loopback ring and its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoopbackError {
    /// The chunk does not fit in the remaining ring space and was skipped.
    #[error("chunk of {len} samples does not fit, {free} free")]
    RingFull {
        /// Samples in the rejected write.
        len: usize,
        /// Samples that were free.
        free: usize,
    },
    /// Sync completion requested while no sync was pending.
    #[error("loopback is not waiting for sync")]
    NotSyncing,
}
