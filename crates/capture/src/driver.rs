//! Per-peripheral capture driver: configure, start, stop.
//!
//! One [`CaptureDriver`] owns one receiver and its DMA channel. Both
//! descriptors are programmed once by [`configure`](CaptureDriver::configure)
//! and re-armed by hardware forever after; `start`/`stop` only toggle the
//! receiver and reset the interrupt-side sequencing.
//!
//! ```text
//!   configure ──► Configured ──start──► Running ──stop──► Configured
//!                     ▲                    │
//!                     └──── configure ─────┘   (implies stop)
//! ```

use platform::audio_types::{ChannelMask, SampleWidth};
use platform::capture::CaptureHardware;
use platform::dma::{DmaLayout, DmaTarget};
use platform::mic_config::{DISCARD_FRAMES, STOP_POLL_LIMIT};

use crate::error::CaptureError;
use crate::handoff::ReadyBits;
use crate::layout::derive_layout;

/// Control side of one capture group.
pub struct CaptureDriver<'a, H: CaptureHardware> {
    hw: H,
    group: usize,
    signal: &'a ReadyBits,
    layout: Option<DmaLayout>,
    running: bool,
    stop_poll_limit: u32,
    discard_frames: u8,
}

impl<'a, H: CaptureHardware> CaptureDriver<'a, H> {
    /// Driver for capture group `group`, signaling through `signal`.
    pub fn new(hw: H, group: usize, signal: &'a ReadyBits) -> Self {
        Self {
            hw,
            group,
            signal,
            layout: None,
            running: false,
            stop_poll_limit: STOP_POLL_LIMIT,
            discard_frames: DISCARD_FRAMES,
        }
    }

    /// Override the stop poll limit and the post-start discard count.
    #[must_use]
    pub fn with_timing(mut self, stop_poll_limit: u32, discard_frames: u8) -> Self {
        self.stop_poll_limit = stop_poll_limit;
        self.discard_frames = discard_frames;
        self
    }

    /// Program both descriptors for `mask`.
    ///
    /// Stops a running receiver first. `targets` are the ping and pong halves
    /// of the raw capture buffer.
    ///
    /// # Errors
    ///
    /// Layout errors from [`derive_layout`], [`CaptureError::BufferTooSmall`]
    /// if a half cannot hold one frame, [`CaptureError::NotQuiesced`] if the
    /// implied stop failed.
    pub fn configure(
        &mut self,
        mask: ChannelMask,
        width: SampleWidth,
        samples_per_frame: usize,
        targets: [DmaTarget; 2],
    ) -> Result<(), CaptureError> {
        self.stop()?;

        let layout = derive_layout(mask, width, samples_per_frame)?;
        let required = layout.half_bytes();
        if let Some(short) = targets.iter().find(|t| t.len < required) {
            return Err(CaptureError::BufferTooSmall {
                required,
                capacity: short.len,
            });
        }

        self.hw.install(&layout, targets);
        self.layout = Some(layout);
        Ok(())
    }

    /// Enable the receiver. No-op while running.
    ///
    /// The first `discard_frames` completions after this call are dropped and
    /// the first signaled completion is always `Ping`.
    ///
    /// # Errors
    ///
    /// [`CaptureError::NotConfigured`] before [`configure`](Self::configure).
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.running {
            return Ok(());
        }
        if self.layout.is_none() {
            return Err(CaptureError::NotConfigured);
        }
        self.signal.restart_group(self.group, self.discard_frames);
        self.hw.enable();
        self.running = true;
        Ok(())
    }

    /// Disable the receiver and wait, bounded, for it to report idle. No-op
    /// while stopped.
    ///
    /// The channel is reset and the driver counts as stopped either way.
    ///
    /// # Errors
    ///
    /// [`CaptureError::NotQuiesced`] if the receiver still reported enabled
    /// after the poll limit.
    pub fn stop(&mut self) -> Result<(), CaptureError> {
        if !self.running {
            return Ok(());
        }
        self.hw.request_disable();

        let mut polls = 0;
        while self.hw.is_receiver_active() && polls < self.stop_poll_limit {
            polls = polls.saturating_add(1);
        }
        let quiesced = !self.hw.is_receiver_active();

        self.hw.reset();
        self.running = false;

        if quiesced {
            Ok(())
        } else {
            #[cfg(feature = "defmt")]
            defmt::warn!("capture group {}: receiver did not quiesce", self.group);
            Err(CaptureError::NotQuiesced { polls })
        }
    }

    /// `true` between a successful `start()` and the next `stop()`.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Layout installed by the last `configure()`.
    pub fn layout(&self) -> Option<&DmaLayout> {
        self.layout.as_ref()
    }

    /// Capture group index.
    pub fn group(&self) -> usize {
        self.group
    }

    /// Underlying hardware.
    pub fn hardware(&self) -> &H {
        &self.hw
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::buffer::PingPong;
    use platform::mocks::{HwCall, MockCaptureHardware};

    static RAW: PingPong<u32, 320> = PingPong::new(0);

    fn configured(hw: MockCaptureHardware, signal: &ReadyBits) -> CaptureDriver<'_, MockCaptureHardware> {
        let mut driver = CaptureDriver::new(hw, 0, signal);
        driver
            .configure(ChannelMask::PAIR_01, SampleWidth::Bytes4, 160, RAW.dma_targets())
            .unwrap();
        driver
    }

    // ── Test A ────────────────────────────────────────────────────────────────
    /// configure() installs the derived layout once.
    #[test]
    fn test_configure_installs_layout() {
        let signal = ReadyBits::new();
        let driver = configured(MockCaptureHardware::new(), &signal);
        assert_eq!(driver.hardware().install_count(), 1);
        assert_eq!(driver.layout().unwrap().major_count, 160);
        assert_eq!(driver.hardware().targets(), Some(RAW.dma_targets()));
    }

    // ── Test B ────────────────────────────────────────────────────────────────
    /// A half smaller than one frame is rejected before touching hardware.
    #[test]
    fn test_configure_rejects_short_buffer() {
        static SHORT: PingPong<u32, 100> = PingPong::new(0);
        let signal = ReadyBits::new();
        let mut driver = CaptureDriver::new(MockCaptureHardware::new(), 0, &signal);
        let err = driver
            .configure(ChannelMask::PAIR_01, SampleWidth::Bytes4, 160, SHORT.dma_targets())
            .unwrap_err();
        assert_eq!(
            err,
            CaptureError::BufferTooSmall {
                required: 1280,
                capacity: 400
            }
        );
        assert_eq!(driver.hardware().install_count(), 0);
    }

    // ── Test C ────────────────────────────────────────────────────────────────
    /// start() and stop() are idempotent.
    #[test]
    fn test_start_stop_idempotent() {
        let signal = ReadyBits::new();
        let mut driver = configured(MockCaptureHardware::new(), &signal);

        driver.start().unwrap();
        driver.start().unwrap();
        assert_eq!(driver.hardware().count(HwCall::Enable), 1);

        driver.stop().unwrap();
        driver.stop().unwrap();
        assert_eq!(driver.hardware().count(HwCall::RequestDisable), 1);
        assert_eq!(driver.hardware().count(HwCall::Reset), 1);
        assert!(!driver.is_running());
    }

    // ── Test D ────────────────────────────────────────────────────────────────
    /// start() before configure() fails without enabling hardware.
    #[test]
    fn test_start_requires_configure() {
        let signal = ReadyBits::new();
        let mut driver = CaptureDriver::new(MockCaptureHardware::new(), 0, &signal);
        assert_eq!(driver.start(), Err(CaptureError::NotConfigured));
        assert_eq!(driver.hardware().count(HwCall::Enable), 0);
    }

    // ── Test E ────────────────────────────────────────────────────────────────
    /// A stuck receiver yields NotQuiesced after the poll limit; the driver
    /// is still reset and counts as stopped.
    #[test]
    fn test_stop_bounded_when_stuck() {
        let signal = ReadyBits::new();
        let mut driver = configured(MockCaptureHardware::stuck(), &signal).with_timing(10, 0);
        driver.start().unwrap();

        assert_eq!(driver.stop(), Err(CaptureError::NotQuiesced { polls: 10 }));
        assert!(!driver.is_running());
        assert_eq!(driver.hardware().count(HwCall::Reset), 1);
    }

    // ── Test F ────────────────────────────────────────────────────────────────
    /// A receiver that idles within the limit stops cleanly.
    #[test]
    fn test_stop_waits_for_idle() {
        let signal = ReadyBits::new();
        let mut hw = MockCaptureHardware::new();
        hw.stop_latency_polls = 5;
        let mut driver = configured(hw, &signal);
        driver.start().unwrap();
        assert_eq!(driver.stop(), Ok(()));
    }

    // ── Test G ────────────────────────────────────────────────────────────────
    /// Reconfiguring a running driver stops it first.
    #[test]
    fn test_reconfigure_stops_first() {
        let signal = ReadyBits::new();
        let mut driver = configured(MockCaptureHardware::new(), &signal);
        driver.start().unwrap();
        driver
            .configure(ChannelMask::PAIR_01, SampleWidth::Bytes4, 160, RAW.dma_targets())
            .unwrap();

        let calls = driver.hardware().calls();
        let disable = calls.iter().position(|c| *c == HwCall::RequestDisable).unwrap();
        let second_install = calls
            .iter()
            .rposition(|c| matches!(c, HwCall::Install(_)))
            .unwrap();
        assert!(disable < second_install);
        assert!(!driver.is_running());
    }

    // ── Test H ────────────────────────────────────────────────────────────────
    /// start() re-arms discarding on the interrupt side.
    #[test]
    fn test_start_restarts_sequencing() {
        use platform::audio_types::Phase;
        use platform::capture::CompletionFlags;

        let signal = ReadyBits::new();
        let mut driver = configured(MockCaptureHardware::new(), &signal).with_timing(10, 2);
        driver.start().unwrap();
        assert_eq!(signal.on_completion(0, CompletionFlags::default(), 0), None);
        assert_eq!(signal.on_completion(0, CompletionFlags::default(), 0), None);
        assert_eq!(
            signal.on_completion(0, CompletionFlags::default(), 0),
            Some(Phase::Ping)
        );
    }
}
