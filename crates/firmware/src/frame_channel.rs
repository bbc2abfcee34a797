//! Frame-ready notifications over an Embassy channel.
//!
//! The mic task must never block on a slow consumer, so [`ChannelSink`]
//! uses `try_send`: a full queue drops the notification and counts it.
//! The downstream processing task awaits `receive()` on the same channel.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use platform::audio_types::Phase;
use platform::capture::FrameSink;

/// Queue depth between the mic task and the processing task. One frame
/// being processed plus one waiting is the steady state.
pub const FRAME_QUEUE_DEPTH: usize = 4;

/// Channel carrying phase-tagged frame notifications.
pub type FrameChannel<M> = Channel<M, Phase, FRAME_QUEUE_DEPTH>;

/// [`FrameSink`] that forwards into a [`FrameChannel`].
pub struct ChannelSink<'a, M: RawMutex> {
    channel: &'a FrameChannel<M>,
    dropped: AtomicU32,
}

impl<'a, M: RawMutex> ChannelSink<'a, M> {
    /// Sink feeding `channel`.
    pub const fn new(channel: &'a FrameChannel<M>) -> Self {
        Self {
            channel,
            dropped: AtomicU32::new(0),
        }
    }

    /// Notifications lost to a full queue.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<M: RawMutex> FrameSink for ChannelSink<'_, M> {
    fn notify(&self, phase: Phase) {
        if self.channel.try_send(phase).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            #[cfg(feature = "defmt")]
            defmt::warn!("frame queue full, {} dropped", phase);
        }
    }
}
