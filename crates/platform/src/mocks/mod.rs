//! Mock implementations for testing
//!
//! This module provides mock implementations of the capture and playback
//! traits for use in unit and integration tests.

#![cfg(any(test, feature = "std"))]

use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;

use crate::amp::AmpOutput;
use crate::audio_types::Phase;
use crate::capture::{CaptureHardware, CompletionAck, CompletionFlags, FrameSink};
use crate::clock::TickSource;
use crate::dma::{DmaLayout, DmaTarget};

/// Hardware operation recorded by [`MockCaptureHardware`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwCall {
    /// `install()` with the given layout.
    Install(DmaLayout),
    /// `enable()`.
    Enable,
    /// `request_disable()`.
    RequestDisable,
    /// `reset()`.
    Reset,
}

/// Mock capture peripheral
pub struct MockCaptureHardware {
    calls: Vec<HwCall, 64>,
    targets: Option<[DmaTarget; 2]>,
    active: bool,
    disable_requested: bool,
    /// Polls of `is_receiver_active()` that still report `true` after a
    /// disable request. `u32::MAX` models a receiver that never stops.
    pub stop_latency_polls: u32,
    pending_polls: core::cell::Cell<u32>,
}

impl MockCaptureHardware {
    /// Create new mock peripheral that acknowledges disable immediately
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            targets: None,
            active: false,
            disable_requested: false,
            stop_latency_polls: 0,
            pending_polls: core::cell::Cell::new(0),
        }
    }

    /// Create a mock whose receiver never acknowledges a disable request
    pub fn stuck() -> Self {
        Self {
            stop_latency_polls: u32::MAX,
            ..Self::new()
        }
    }

    /// All operations so far, oldest first
    pub fn calls(&self) -> &[HwCall] {
        &self.calls
    }

    /// Number of recorded calls equal to `call`
    pub fn count(&self, call: HwCall) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }

    /// Number of `install()` calls regardless of layout
    pub fn install_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, HwCall::Install(_)))
            .count()
    }

    /// Destinations from the last `install()`
    pub fn targets(&self) -> Option<[DmaTarget; 2]> {
        self.targets
    }

    /// Forget recorded calls
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    fn record(&mut self, call: HwCall) {
        // Oldest entries win once the log is full; tests never get near 64.
        let _ = self.calls.push(call);
    }
}

impl Default for MockCaptureHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureHardware for MockCaptureHardware {
    fn install(&mut self, layout: &DmaLayout, targets: [DmaTarget; 2]) {
        self.targets = Some(targets);
        self.record(HwCall::Install(*layout));
    }

    fn enable(&mut self) {
        self.active = true;
        self.disable_requested = false;
        self.record(HwCall::Enable);
    }

    fn request_disable(&mut self) {
        self.disable_requested = true;
        self.pending_polls.set(self.stop_latency_polls);
        self.record(HwCall::RequestDisable);
    }

    fn is_receiver_active(&self) -> bool {
        if !self.active || !self.disable_requested {
            return self.active;
        }
        match self.pending_polls.get() {
            0 => false,
            u32::MAX => true,
            n => {
                self.pending_polls.set(n.saturating_sub(1));
                true
            }
        }
    }

    fn reset(&mut self) {
        self.active = false;
        self.record(HwCall::Reset);
    }
}

/// Mock interrupt acknowledgment with a programmable error flag
#[derive(Debug, Default)]
pub struct MockCompletionAck {
    /// Report a transfer error on the next acknowledgment
    pub error: bool,
    /// Number of acknowledgments
    pub acks: usize,
}

impl CompletionAck for MockCompletionAck {
    #[allow(clippy::arithmetic_side_effects)] // Mock counter; overflow not a concern in tests
    fn acknowledge(&mut self) -> CompletionFlags {
        self.acks += 1;
        CompletionFlags {
            error: core::mem::take(&mut self.error),
        }
    }
}

/// Mock timestamp timer, set by the test
#[derive(Debug, Default)]
pub struct MockTickSource {
    now: AtomicU32,
}

impl MockTickSource {
    /// Create a timer reading `start`
    pub fn new(start: u32) -> Self {
        Self {
            now: AtomicU32::new(start),
        }
    }

    /// Jump to `ticks`
    pub fn set(&self, ticks: u32) {
        self.now.store(ticks, Ordering::Relaxed);
    }

    /// Advance by `ticks`, wrapping like the hardware counter
    pub fn advance(&self, ticks: u32) {
        let now = self.now.load(Ordering::Relaxed);
        self.now.store(now.wrapping_add(ticks), Ordering::Relaxed);
    }
}

impl TickSource for MockTickSource {
    fn now(&self) -> u32 {
        self.now.load(Ordering::Relaxed)
    }
}

/// Frame sink that records every notification
pub struct RecordingSink {
    phases: Mutex<CriticalSectionRawMutex, RefCell<Vec<Phase, 256>>>,
}

impl RecordingSink {
    /// Create an empty sink
    pub const fn new() -> Self {
        Self {
            phases: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    /// Copy of all notifications so far
    pub fn phases(&self) -> Vec<Phase, 256> {
        self.phases.lock(|p| p.borrow().clone())
    }

    /// Number of notifications so far
    pub fn len(&self) -> usize {
        self.phases.lock(|p| p.borrow().len())
    }

    /// `true` if nothing has been notified
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSink for RecordingSink {
    fn notify(&self, phase: Phase) {
        self.phases.lock(|p| {
            let _ = p.borrow_mut().push(phase);
        });
    }
}

/// Mock amplifier transmitter; keeps the last few chunks
pub struct MockAmpOutput {
    /// Lengths of every chunk transferred, in samples
    pub chunk_lens: Vec<usize, 64>,
    /// Samples of the most recent chunk
    pub last: Vec<i16, 4096>,
    /// Fail the next transfer
    pub fail_next: bool,
}

impl MockAmpOutput {
    /// Create a transmitter that accepts everything
    pub fn new() -> Self {
        Self {
            chunk_lens: Vec::new(),
            last: Vec::new(),
            fail_next: false,
        }
    }
}

impl Default for MockAmpOutput {
    fn default() -> Self {
        Self::new()
    }
}

/// Error reported by [`MockAmpOutput`] when `fail_next` is set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockTransferError;

impl AmpOutput for MockAmpOutput {
    type Error = MockTransferError;

    async fn transfer(&mut self, samples: &[i16]) -> Result<(), Self::Error> {
        if core::mem::take(&mut self.fail_next) {
            return Err(MockTransferError);
        }
        let _ = self.chunk_lens.push(samples.len());
        self.last.clear();
        let keep = samples.len().min(self.last.capacity());
        let _ = self.last.extend_from_slice(samples.get(..keep).unwrap_or(&[]));
        Ok(())
    }
}
