//! Loopback sync state machine.
//!
//! `SyncState` is a pure, allocation-free state machine that tracks whether
//! playback data should flow into the echo ring. It does no I/O and does
//! not touch the ring itself; [`crate::Loopback`] owns both behind one
//! mutex and applies the side effects.
//!
//! ```text
//!            enable()             complete_sync()
//! Disabled ──────────► NeedSync ──────────────────► Enabled
//!    ▲                    │                            │
//!    └────────────────────┴──── disable() ◄────────────┘
//! ```

use crate::error::LoopbackError;

/// Current loopback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoopbackState {
    /// Capture is off; playback bypasses the ring.
    Disabled,
    /// Capture just came on; the next chunk must wait for in-flight
    /// transfers to drain before it can define the delay.
    NeedSync,
    /// Playback chunks are mirrored into the ring.
    Enabled,
}

/// Pure state machine for loopback sync control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncState {
    state: LoopbackState,
    sessions: u32,
}

impl SyncState {
    /// Create a machine in the `Disabled` state.
    pub const fn new() -> Self {
        Self {
            state: LoopbackState::Disabled,
            sessions: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> LoopbackState {
        self.state
    }

    /// Completed syncs since creation.
    pub fn sessions(&self) -> u32 {
        self.sessions
    }

    /// Request a fresh sync.
    ///
    /// Transitions every state to `NeedSync`, so an enable while already
    /// enabled forces the next playback chunk to re-measure the delay.
    pub fn enable(&mut self) {
        self.state = LoopbackState::NeedSync;
    }

    /// Stop mirroring playback. Always succeeds.
    pub fn disable(&mut self) {
        self.state = LoopbackState::Disabled;
    }

    /// Finish a pending sync.
    ///
    /// Transitions:
    /// - `NeedSync → Enabled`
    /// - `Disabled`: returns `Err(NotSyncing)`
    /// - `Enabled`: returns `Err(NotSyncing)`
    ///
    /// # Errors
    ///
    /// [`LoopbackError::NotSyncing`] when no sync is pending, typically
    /// because capture was switched off during the drain wait.
    pub fn complete_sync(&mut self) -> Result<(), LoopbackError> {
        match self.state {
            LoopbackState::NeedSync => {
                self.state = LoopbackState::Enabled;
                self.sessions = self.sessions.wrapping_add(1);
                Ok(())
            }
            LoopbackState::Disabled | LoopbackState::Enabled => Err(LoopbackError::NotSyncing),
        }
    }

    /// `true` when playback chunks go into the ring.
    pub fn mirrors_playback(&self) -> bool {
        self.state == LoopbackState::Enabled
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}
