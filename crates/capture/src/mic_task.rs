//! The mic task: waits for ready bits, converts, fetches the echo reference
//! and notifies the consumer, recovering from stalls on its own.
//!
//! # Life cycle
//!
//! ```text
//!   Init ──mics_on──► Running ◄──────────────┐
//!                        │                   │
//!           ready bits ──┤ convert + notify ─┤
//!   timeout / HW_ERROR ──┤ retries < budget ─┤
//!                        └─ mics_off+mics_on ┘  (stall recovery)
//! ```
//!
//! A frame of one phase is announced only after every capture group has
//! delivered that phase; announcements strictly alternate Ping, Pong, Ping…
//!
//! # Usage
//!
//! ```rust,ignore
//! static READY: ReadyBits = ReadyBits::new();
//! static RAW0: RawBuffer<1280> = RawBuffer::new(0);
//! static PCM: PcmBuffer = PcmBuffer::new(0);
//! static ECHO: EchoBuffer = EchoBuffer::new(0);
//!
//! let mut task = MicTaskBuilder::new(MicConfig::i2s_dual(), &READY)
//!     .group(sai1, &RAW0)
//!     .pcm(&PCM)
//!     .echo_buffer(&ECHO)
//!     .converter(I2sConverter::new(SampleWidth::Bytes4))
//!     .sink(&FRAMES)
//!     .echo_source(&LOOPBACK)
//!     .build()?;
//! task.run().await
//! ```

use embassy_time::{with_timeout, Duration, Timer};
use heapless::Vec;
use platform::audio_types::Phase;
use platform::capture::{CaptureHardware, EchoReferenceSource, FrameSink};
use platform::mic_config::{MicConfig, DECIMATOR_WORKSPACE_BYTES, MAX_CAPTURE_GROUPS};

use crate::buffer::{EchoBuffer, PcmBuffer, RawBuffer};
use crate::convert::FrameConverter;
use crate::driver::CaptureDriver;
use crate::error::CaptureError;
use crate::handoff::{phase_bit, phase_mask, ReadyBits, HW_ERROR, OVERRUN};
use crate::layout::derive_layout;

// ─── Stall tracking ──────────────────────────────────────────────────────────

/// Consecutive-timeout tracker.
///
/// With a budget of `n`, the first `n` timeouts are tolerated and the next
/// one asks for recovery. Any delivered frame returns to `Healthy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StallState {
    /// Frames are arriving.
    #[default]
    Healthy,
    /// One or more timeouts since the last frame.
    Stalled {
        /// Timeouts tolerated so far. Saturates at `u8::MAX`.
        retries: u8,
    },
}

impl StallState {
    /// Record a timeout; returns `true` if the peripheral must be restarted.
    pub fn on_timeout(&mut self, budget: u8) -> bool {
        let retries = self.retries();
        if retries >= budget {
            *self = Self::Healthy;
            true
        } else {
            *self = Self::Stalled {
                retries: retries.saturating_add(1),
            };
            false
        }
    }

    /// A frame arrived, or capture is intentionally off.
    pub fn on_frame(&mut self) {
        *self = Self::Healthy;
    }

    /// Timeouts tolerated since the last frame.
    pub fn retries(&self) -> u8 {
        match self {
            Self::Healthy => 0,
            Self::Stalled { retries } => *retries,
        }
    }
}

// ─── Task state ──────────────────────────────────────────────────────────────

/// Where the task is in its life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskState {
    /// Built, capture not yet started.
    Init,
    /// Capture configured; waiting on ready bits.
    Running,
}

/// Result of one [`MicTask::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StepEvent {
    /// Capture was started from `Init`.
    Started,
    /// Ready bits were handled; `notified` frames were announced.
    Frames {
        /// Frames announced to the sink in this step.
        notified: u8,
    },
    /// Timeout (or hardware error) absorbed by the retry budget.
    Stalled {
        /// Timeouts tolerated since the last frame.
        retries: u8,
    },
    /// Stall recovery restarted every group.
    Recovered,
    /// Timeout while capture is off; expected.
    Idle,
}

/// Diagnostic counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CaptureStats {
    /// Frames announced to the sink.
    pub frames: u32,
    /// Timeouts while capture was on.
    pub timeouts: u32,
    /// Hardware error bits observed.
    pub hw_errors: u32,
    /// Overrun bits observed.
    pub overruns: u32,
    /// Stall recoveries performed.
    pub recoveries: u32,
    /// Recoveries whose stop did not quiesce.
    pub failed_stops: u32,
}

// ─── Builder ─────────────────────────────────────────────────────────────────

/// Fluent builder for [`MicTask`].
///
/// Every collaborator is mandatory; [`build`](Self::build) names the first
/// one missing. Hardware and raw buffers are added per capture group, in the
/// same order as [`MicConfig::groups`].
pub struct MicTaskBuilder<'a, H, C, S, E, const RAW: usize>
where
    H: CaptureHardware,
{
    config: MicConfig,
    signal: &'a ReadyBits,
    groups: Vec<(H, &'a RawBuffer<RAW>), MAX_CAPTURE_GROUPS>,
    too_many_groups: bool,
    pcm: Option<&'a PcmBuffer>,
    echo: Option<&'a EchoBuffer>,
    converter: Option<C>,
    sink: Option<S>,
    echo_source: Option<E>,
    workspace_bytes: usize,
}

impl<'a, H, C, S, E, const RAW: usize> MicTaskBuilder<'a, H, C, S, E, RAW>
where
    H: CaptureHardware,
    C: FrameConverter,
    S: FrameSink,
    E: EchoReferenceSource,
{
    /// Start building a task for `config`, signaled through `signal`.
    pub fn new(config: MicConfig, signal: &'a ReadyBits) -> Self {
        Self {
            config,
            signal,
            groups: Vec::new(),
            too_many_groups: false,
            pcm: None,
            echo: None,
            converter: None,
            sink: None,
            echo_source: None,
            workspace_bytes: DECIMATOR_WORKSPACE_BYTES,
        }
    }

    /// Add the next capture group's peripheral and raw buffer.
    #[must_use]
    pub fn group(mut self, hw: H, raw: &'a RawBuffer<RAW>) -> Self {
        if self.groups.push((hw, raw)).is_err() {
            self.too_many_groups = true;
        }
        self
    }

    /// PCM output buffer.
    #[must_use]
    pub fn pcm(mut self, pcm: &'a PcmBuffer) -> Self {
        self.pcm = Some(pcm);
        self
    }

    /// Echo reference output buffer.
    #[must_use]
    pub fn echo_buffer(mut self, echo: &'a EchoBuffer) -> Self {
        self.echo = Some(echo);
        self
    }

    /// Raw → PCM conversion strategy.
    #[must_use]
    pub fn converter(mut self, converter: C) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Downstream frame consumer.
    #[must_use]
    pub fn sink(mut self, sink: S) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Echo reference provider.
    #[must_use]
    pub fn echo_source(mut self, echo_source: E) -> Self {
        self.echo_source = Some(echo_source);
        self
    }

    /// Working memory reserved for the converter, in bytes.
    ///
    /// Default: [`DECIMATOR_WORKSPACE_BYTES`].
    #[must_use]
    pub fn workspace_bytes(mut self, bytes: usize) -> Self {
        self.workspace_bytes = bytes;
        self
    }

    /// Validate and assemble the task. No hardware is touched.
    ///
    /// # Errors
    ///
    /// - [`CaptureError::Config`] if the configuration is invalid,
    /// - [`CaptureError::UnsupportedChannelMask`] if a group has no DMA layout,
    /// - [`CaptureError::TooManyGroups`] if more peripherals than groups,
    /// - [`CaptureError::MissingCollaborator`] naming what was not supplied,
    /// - [`CaptureError::ConverterMismatch`] if the converter does not decode
    ///   the configured source,
    /// - [`CaptureError::WorkspaceTooSmall`] if the converter needs more memory,
    /// - [`CaptureError::BufferTooSmall`] if a raw half cannot hold a frame.
    pub fn build(self) -> Result<MicTask<'a, H, C, S, E, RAW>, CaptureError> {
        self.config.validate()?;
        let source = self.config.source;
        for mask in &self.config.groups {
            derive_layout(*mask, source.raw_width(), source.raw_samples_per_frame())?;
        }

        let configured = self.config.groups.len();
        if self.too_many_groups || self.groups.len() > configured {
            return Err(CaptureError::TooManyGroups);
        }
        if self.groups.len() < configured {
            return Err(CaptureError::MissingCollaborator("capture hardware"));
        }
        let pcm = self.pcm.ok_or(CaptureError::MissingCollaborator("PCM buffer"))?;
        let echo = self
            .echo
            .ok_or(CaptureError::MissingCollaborator("echo buffer"))?;
        let converter = self
            .converter
            .ok_or(CaptureError::MissingCollaborator("converter"))?;
        let sink = self
            .sink
            .ok_or(CaptureError::MissingCollaborator("frame sink"))?;
        let echo_source = self
            .echo_source
            .ok_or(CaptureError::MissingCollaborator("echo reference source"))?;

        if !converter.accepts(source) {
            return Err(CaptureError::ConverterMismatch);
        }

        let required = converter.required_workspace();
        if required > self.workspace_bytes {
            #[cfg(feature = "defmt")]
            defmt::error!(
                "converter needs {} bytes of workspace, {} reserved",
                required,
                self.workspace_bytes
            );
            return Err(CaptureError::WorkspaceTooSmall {
                required,
                available: self.workspace_bytes,
            });
        }

        for mask in &self.config.groups {
            let required = self.config.raw_frame_bytes(*mask);
            if RAW < required {
                return Err(CaptureError::BufferTooSmall {
                    required,
                    capacity: RAW,
                });
            }
        }

        let mut drivers = Vec::new();
        let mut raw = Vec::new();
        for (index, (hw, buffer)) in self.groups.into_iter().enumerate() {
            let driver = CaptureDriver::new(hw, index, self.signal)
                .with_timing(self.config.stop_poll_limit, self.config.discard_frames);
            if drivers.push(driver).is_err() || raw.push(buffer).is_err() {
                return Err(CaptureError::TooManyGroups);
            }
        }

        Ok(MicTask {
            config: self.config,
            signal: self.signal,
            drivers,
            raw,
            pcm,
            echo,
            converter,
            sink,
            echo_source,
            state: TaskState::Init,
            stall: StallState::Healthy,
            expected: Phase::Ping,
            converted: 0,
            enabled: false,
            stats: CaptureStats::default(),
        })
    }
}

// ─── Task ────────────────────────────────────────────────────────────────────

/// Capture task for one set of microphones.
pub struct MicTask<'a, H, C, S, E, const RAW: usize>
where
    H: CaptureHardware,
{
    config: MicConfig,
    signal: &'a ReadyBits,
    drivers: Vec<CaptureDriver<'a, H>, MAX_CAPTURE_GROUPS>,
    raw: Vec<&'a RawBuffer<RAW>, MAX_CAPTURE_GROUPS>,
    pcm: &'a PcmBuffer,
    echo: &'a EchoBuffer,
    converter: C,
    sink: S,
    echo_source: E,
    state: TaskState,
    stall: StallState,
    expected: Phase,
    converted: u32,
    enabled: bool,
    stats: CaptureStats,
}

impl<'a, H, C, S, E, const RAW: usize> MicTask<'a, H, C, S, E, RAW>
where
    H: CaptureHardware,
    C: FrameConverter,
    S: FrameSink,
    E: EchoReferenceSource,
{
    /// Start capture: clear stale state, zero buffers, configure and start
    /// every group, then enable the echo reference. No-op while on.
    ///
    /// # Errors
    ///
    /// Driver errors from `configure` or `start`.
    pub async fn mics_on(&mut self) -> Result<(), CaptureError> {
        if self.enabled {
            return Ok(());
        }
        self.signal.clear(u32::MAX);
        self.converted = 0;
        self.expected = Phase::Ping;
        self.converter.reset();
        self.zero_buffers();

        let source = self.config.source;
        for (driver, (mask, raw)) in self
            .drivers
            .iter_mut()
            .zip(self.config.groups.iter().zip(self.raw.iter()))
        {
            driver.configure(
                *mask,
                source.raw_width(),
                source.raw_samples_per_frame(),
                raw.dma_targets(),
            )?;
        }
        for driver in &mut self.drivers {
            driver.start()?;
        }

        self.enabled = true;
        self.state = TaskState::Running;
        self.echo_source.enable().await;
        Ok(())
    }

    /// Stop capture, reset sequencing, zero PCM and disable the echo
    /// reference. No-op while off.
    ///
    /// Every group is stopped even if an earlier one fails.
    ///
    /// # Errors
    ///
    /// The first [`CaptureError::NotQuiesced`] encountered.
    pub async fn mics_off(&mut self) -> Result<(), CaptureError> {
        if !self.enabled {
            return Ok(());
        }
        let mut result = Ok(());
        for driver in &mut self.drivers {
            if let Err(err) = driver.stop() {
                result = result.and(Err(err));
            }
        }
        self.signal.clear(u32::MAX);
        self.converted = 0;
        self.expected = Phase::Ping;
        // SAFETY: every receiver is stopped and its channel reset; the
        // consumer has been notified of nothing since the clear above.
        unsafe {
            self.pcm.fill(0);
            self.echo.fill(0);
        }

        self.enabled = false;
        self.echo_source.disable().await;
        result
    }

    /// Wait for and handle one event. Starts capture from `Init`.
    ///
    /// # Errors
    ///
    /// Errors from starting capture or converting a frame. Stall recovery
    /// failures are absorbed and counted, not returned.
    pub async fn step(&mut self) -> Result<StepEvent, CaptureError> {
        if self.state == TaskState::Init {
            self.mics_on().await?;
            return Ok(StepEvent::Started);
        }

        let Ok(bits) = with_timeout(self.event_timeout(), self.signal.wait()).await else {
            return Ok(self.on_timeout().await);
        };

        if bits & OVERRUN != 0 {
            self.stats.overruns = self.stats.overruns.saturating_add(1);
            self.signal.clear(OVERRUN);
            #[cfg(feature = "defmt")]
            defmt::warn!("mic capture overrun; stale frame overwritten");
        }

        if bits & HW_ERROR != 0 {
            self.stats.hw_errors = self.stats.hw_errors.saturating_add(1);
            self.signal.clear(HW_ERROR);
            #[cfg(feature = "defmt")]
            defmt::warn!("mic capture DMA error");
            return Ok(self.on_timeout().await);
        }

        let mut notified = 0u8;
        for phase in [self.expected, self.expected.other()] {
            if self.handle_phase(bits, phase).await? {
                notified = notified.saturating_add(1);
            }
        }
        if notified > 0 {
            self.stall.on_frame();
        }
        Ok(StepEvent::Frames { notified })
    }

    /// Run forever.
    ///
    /// A failing step backs off for one event timeout before the next, so
    /// an error raised before the first `.await` never spins the executor.
    pub async fn run(&mut self) -> ! {
        loop {
            if let Err(_err) = self.step().await {
                #[cfg(feature = "defmt")]
                defmt::error!("mic task: {}", _err);
                Timer::after(self.event_timeout()).await;
            }
        }
    }

    fn event_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.config.event_timeout_ms))
    }

    /// Convert every group's half of `phase` signaled in `bits`; announce the
    /// frame once all groups have delivered it. Returns `true` if announced.
    async fn handle_phase(&mut self, bits: u32, phase: Phase) -> Result<bool, CaptureError> {
        let groups = self.drivers.len();
        for group in 0..groups {
            let bit = phase_bit(group, phase);
            if bits & bit == 0 {
                continue;
            }
            if group == 0 {
                self.fetch_echo(phase).await;
            }
            self.convert_group(group, phase)?;
            self.converted |= bit;
            self.signal.clear(bit);
        }

        let full = phase_mask(phase, groups);
        if self.converted & full != full {
            return Ok(false);
        }
        self.converted &= !full;
        self.expected = phase.other();
        self.stats.frames = self.stats.frames.saturating_add(1);
        self.sink.notify(phase);
        Ok(true)
    }

    async fn fetch_echo(&mut self, phase: Phase) {
        let Some(tick) = self.signal.capture_tick() else {
            return;
        };
        // SAFETY: the consumer only reads this half after the notification
        // for `phase`, which has not been sent yet for this frame.
        let out = unsafe { self.echo.half_mut(phase) };
        self.echo_source.fetch(out, tick).await;
    }

    fn convert_group(&mut self, group: usize, phase: Phase) -> Result<(), CaptureError> {
        let (Some(mask), Some(raw)) = (self.config.groups.get(group), self.raw.get(group)) else {
            return Err(CaptureError::TooManyGroups);
        };
        let bytes = self.config.raw_frame_bytes(*mask);
        // SAFETY: the ready bit for `phase` is set, so DMA is filling the
        // other half; the interrupt never writes buffer memory.
        let raw_half = unsafe { raw.half(phase) };
        let raw_frame = raw_half.get(..bytes).ok_or(CaptureError::BufferTooSmall {
            required: bytes,
            capacity: RAW,
        })?;
        // SAFETY: as in `fetch_echo`; the PCM half is handed over by notify.
        let pcm_half = unsafe { self.pcm.half_mut(phase) };
        self.converter.convert(
            raw_frame,
            mask.count(),
            self.config.channel_offset(group),
            pcm_half,
        )
    }

    async fn on_timeout(&mut self) -> StepEvent {
        if !self.enabled {
            self.stall.on_frame();
            return StepEvent::Idle;
        }
        self.stats.timeouts = self.stats.timeouts.saturating_add(1);
        if !self.stall.on_timeout(self.config.retry_budget) {
            return StepEvent::Stalled {
                retries: self.stall.retries(),
            };
        }

        #[cfg(feature = "defmt")]
        defmt::warn!("mic capture stalled; restarting");
        self.stats.recoveries = self.stats.recoveries.saturating_add(1);
        if self.mics_off().await.is_err() {
            self.stats.failed_stops = self.stats.failed_stops.saturating_add(1);
        }
        if let Err(_err) = self.mics_on().await {
            #[cfg(feature = "defmt")]
            defmt::error!("mic restart failed: {}", _err);
        }
        StepEvent::Recovered
    }

    fn zero_buffers(&self) {
        // SAFETY: only called with every receiver stopped and before any
        // notification of the new session.
        unsafe {
            for raw in &self.raw {
                raw.fill(0);
            }
            self.pcm.fill(0);
            self.echo.fill(0);
        }
    }

    /// Life-cycle state.
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// `true` between `mics_on` and `mics_off`.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Phase the next announcement will carry.
    pub fn expected_phase(&self) -> Phase {
        self.expected
    }

    /// Diagnostic counters.
    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    /// Stall tracker.
    pub fn stall_state(&self) -> StallState {
        self.stall
    }

    /// Capture drivers, one per group.
    pub fn drivers(&self) -> &[CaptureDriver<'a, H>] {
        &self.drivers
    }

    /// Runtime configuration.
    pub fn config(&self) -> &MicConfig {
        &self.config
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ── Test A ────────────────────────────────────────────────────────────────
    /// Budget 1: first timeout tolerated, second asks for recovery.
    #[test]
    fn test_stall_budget_one() {
        let mut stall = StallState::default();
        assert!(!stall.on_timeout(1));
        assert_eq!(stall, StallState::Stalled { retries: 1 });
        assert!(stall.on_timeout(1));
        assert_eq!(stall, StallState::Healthy);
    }

    // ── Test B ────────────────────────────────────────────────────────────────
    /// Budget 0 recovers on the first timeout.
    #[test]
    fn test_stall_budget_zero() {
        let mut stall = StallState::default();
        assert!(stall.on_timeout(0));
    }

    // ── Test C ────────────────────────────────────────────────────────────────
    /// A delivered frame clears accumulated retries.
    #[test]
    fn test_frame_resets_retries() {
        let mut stall = StallState::default();
        stall.on_timeout(3);
        stall.on_timeout(3);
        assert_eq!(stall.retries(), 2);
        stall.on_frame();
        assert_eq!(stall.retries(), 0);
    }
}
