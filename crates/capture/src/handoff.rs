//! Interrupt → task handoff.
//!
//! The completion interrupt is the only producer and the mic task the only
//! consumer. Each side writes only its own direction of the protocol:
//!
//! - the interrupt sets ready / overrun / error bits and stores the capture tick,
//! - the task clears the bits it consumed.
//!
//! # Bit layout
//!
//! ```text
//! bit  0  group 0 ping      bit  1  group 0 pong
//! bit  2  group 1 ping      bit  3  group 1 pong
//! bit  8  OVERRUN           bit  9  HW_ERROR
//! ```
//!
//! A second completion on a phase whose bit is still set raises `OVERRUN`
//! once; the ready bit itself stays set (the stale frame is overwritten by DMA).

use core::future::poll_fn;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use core::task::Poll;

use embassy_sync::waitqueue::AtomicWaker;
use platform::audio_types::Phase;
use platform::capture::{CompletionAck, CompletionFlags};
use platform::clock::TickSource;
use platform::mic_config::MAX_CAPTURE_GROUPS;

/// Overrun: a phase completed again before the task consumed it.
pub const OVERRUN: u32 = 1 << 8;

/// Transfer error latched by the completion interrupt.
pub const HW_ERROR: u32 = 1 << 9;

/// Ready bit for `phase` of capture group `group`.
#[must_use]
#[allow(clippy::arithmetic_side_effects)] // Safety: group < MAX_CAPTURE_GROUPS, shift <= 3
pub const fn phase_bit(group: usize, phase: Phase) -> u32 {
    let shift = group * 2
        + match phase {
            Phase::Ping => 0,
            Phase::Pong => 1,
        };
    1 << shift
}

/// Ready bits of `phase` across the first `groups` capture groups.
#[must_use]
pub fn phase_mask(phase: Phase, groups: usize) -> u32 {
    (0..groups.min(MAX_CAPTURE_GROUPS)).fold(0, |acc, g| acc | phase_bit(g, phase))
}

/// Per-group sequencing owned by the interrupt.
struct GroupSequence {
    discard: AtomicU8,
    toggle: AtomicU32,
}

impl GroupSequence {
    const fn new() -> Self {
        Self {
            discard: AtomicU8::new(0),
            toggle: AtomicU32::new(0),
        }
    }
}

/// Shared ready-bit set plus the latched capture timestamp.
pub struct ReadyBits {
    bits: AtomicU32,
    waker: AtomicWaker,
    groups: [GroupSequence; MAX_CAPTURE_GROUPS],
    tick: AtomicU32,
    tick_valid: AtomicBool,
    overruns: AtomicU32,
}

impl ReadyBits {
    /// Empty set, suitable for a `static`.
    pub const fn new() -> Self {
        Self {
            bits: AtomicU32::new(0),
            waker: AtomicWaker::new(),
            groups: [GroupSequence::new(), GroupSequence::new()],
            tick: AtomicU32::new(0),
            tick_valid: AtomicBool::new(false),
            overruns: AtomicU32::new(0),
        }
    }

    // ── Interrupt side ──────────────────────────────────────────────────────

    /// Record one completed half-buffer of `group`.
    ///
    /// Returns the phase that was signaled, or `None` while discarding.
    pub fn on_completion(&self, group: usize, flags: CompletionFlags, tick: u32) -> Option<Phase> {
        self.tick.store(tick, Ordering::Relaxed);
        self.tick_valid.store(true, Ordering::Release);

        if flags.error {
            self.bits.fetch_or(HW_ERROR, Ordering::AcqRel);
            self.waker.wake();
        }

        let seq = self.groups.get(group)?;
        let discarding = seq
            .discard
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if discarding {
            return None;
        }

        let phase = Phase::from_toggle(seq.toggle.fetch_add(1, Ordering::AcqRel));
        let bit = phase_bit(group, phase);
        let previous = self.bits.fetch_or(bit, Ordering::AcqRel);
        if previous & bit != 0 {
            let already = self.bits.fetch_or(OVERRUN, Ordering::AcqRel);
            if already & OVERRUN == 0 {
                self.overruns.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.waker.wake();
        Some(phase)
    }

    // ── Task side ───────────────────────────────────────────────────────────

    /// Wait until any bit is set; returns the set without clearing it.
    pub async fn wait(&self) -> u32 {
        poll_fn(|cx| {
            self.waker.register(cx.waker());
            match self.bits.load(Ordering::Acquire) {
                0 => Poll::Pending,
                bits => Poll::Ready(bits),
            }
        })
        .await
    }

    /// Current bits without waiting.
    pub fn peek(&self) -> u32 {
        self.bits.load(Ordering::Acquire)
    }

    /// Clear consumed bits.
    pub fn clear(&self, mask: u32) {
        self.bits.fetch_and(!mask, Ordering::AcqRel);
    }

    /// Tick latched by the most recent completion, if any.
    pub fn capture_tick(&self) -> Option<u32> {
        self.tick_valid
            .load(Ordering::Acquire)
            .then(|| self.tick.load(Ordering::Relaxed))
    }

    /// Distinct overrun events since construction.
    pub fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Restart sequencing of `group`: next completion is `Ping` after
    /// `discard` dropped frames; pending bits of the group are cleared.
    ///
    /// Called only while the group's transfer is stopped.
    pub fn restart_group(&self, group: usize, discard: u8) {
        if let Some(seq) = self.groups.get(group) {
            seq.toggle.store(0, Ordering::Release);
            seq.discard.store(discard, Ordering::Release);
        }
        self.clear(phase_bit(group, Phase::Ping) | phase_bit(group, Phase::Pong));
    }

    /// Completions of `group` signaled since its last restart.
    pub fn toggle_count(&self, group: usize) -> u32 {
        self.groups
            .get(group)
            .map_or(0, |seq| seq.toggle.load(Ordering::Acquire))
    }
}

impl Default for ReadyBits {
    fn default() -> Self {
        Self::new()
    }
}

/// Completion interrupt body for capture group `group`.
///
/// Acknowledges the hardware, latches the timestamp, then signals the task.
pub fn on_completion_interrupt<A, T>(
    bits: &ReadyBits,
    group: usize,
    ack: &mut A,
    clock: &T,
) -> Option<Phase>
where
    A: CompletionAck,
    T: TickSource,
{
    let flags = ack.acknowledge();
    bits.on_completion(group, flags, clock.now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform::mocks::{MockCompletionAck, MockTickSource};

    // ── Test A ────────────────────────────────────────────────────────────────
    /// Frames after restart are discarded without signaling.
    #[test]
    fn test_discards_after_restart() {
        let bits = ReadyBits::new();
        bits.restart_group(0, 4);
        for _ in 0..4 {
            assert_eq!(bits.on_completion(0, CompletionFlags::default(), 1), None);
        }
        assert_eq!(bits.peek(), 0);
        assert_eq!(
            bits.on_completion(0, CompletionFlags::default(), 1),
            Some(Phase::Ping)
        );
        assert_eq!(bits.peek(), phase_bit(0, Phase::Ping));
    }

    // ── Test B ────────────────────────────────────────────────────────────────
    /// Phases alternate Ping, Pong, Ping…
    #[test]
    fn test_phases_alternate() {
        let bits = ReadyBits::new();
        let phases: heapless::Vec<Option<Phase>, 4> = (0..4)
            .map(|_| {
                let p = bits.on_completion(0, CompletionFlags::default(), 0);
                bits.clear(bits.peek());
                p
            })
            .collect();
        assert_eq!(
            phases.as_slice(),
            &[
                Some(Phase::Ping),
                Some(Phase::Pong),
                Some(Phase::Ping),
                Some(Phase::Pong)
            ]
        );
    }

    // ── Test C ────────────────────────────────────────────────────────────────
    /// A phase completing twice before consumption sets OVERRUN exactly once.
    #[test]
    fn test_overrun_counted_once() {
        let bits = ReadyBits::new();
        bits.on_completion(0, CompletionFlags::default(), 0); // ping
        bits.on_completion(0, CompletionFlags::default(), 0); // pong
        assert_eq!(bits.peek() & OVERRUN, 0);

        bits.on_completion(0, CompletionFlags::default(), 0); // ping again, unconsumed
        assert_ne!(bits.peek() & OVERRUN, 0);
        assert_eq!(bits.overruns(), 1);

        // Still unconsumed: the bit stays, the event is not double-counted.
        bits.on_completion(0, CompletionFlags::default(), 0); // pong again
        assert_eq!(bits.overruns(), 1);

        bits.clear(OVERRUN);
        bits.on_completion(0, CompletionFlags::default(), 0); // ping a third time
        assert_eq!(bits.overruns(), 2);
    }

    // ── Test D ────────────────────────────────────────────────────────────────
    /// Groups signal independent bits.
    #[test]
    fn test_groups_use_own_bits() {
        let bits = ReadyBits::new();
        bits.on_completion(1, CompletionFlags::default(), 0);
        assert_eq!(bits.peek(), phase_bit(1, Phase::Ping));
        assert_eq!(phase_mask(Phase::Ping, 2), 0b0101);
        assert_eq!(phase_mask(Phase::Pong, 2), 0b1010);
        assert_eq!(phase_mask(Phase::Pong, 1), 0b0010);
    }

    // ── Test E ────────────────────────────────────────────────────────────────
    /// The interrupt body acknowledges, timestamps and raises HW_ERROR.
    #[test]
    fn test_interrupt_body() {
        let bits = ReadyBits::new();
        let mut ack = MockCompletionAck {
            error: true,
            ..MockCompletionAck::default()
        };
        let clock = MockTickSource::new(1234);
        assert_eq!(bits.capture_tick(), None);

        on_completion_interrupt(&bits, 0, &mut ack, &clock);

        assert_eq!(ack.acks, 1);
        assert_eq!(bits.capture_tick(), Some(1234));
        assert_ne!(bits.peek() & HW_ERROR, 0);
    }

    // ── Test F ────────────────────────────────────────────────────────────────
    /// wait() resolves once a bit is set and leaves it set.
    #[test]
    fn test_wait_returns_snapshot() {
        let bits = ReadyBits::new();
        bits.on_completion(0, CompletionFlags::default(), 0);
        let seen = embassy_futures::block_on(bits.wait());
        assert_eq!(seen, phase_bit(0, Phase::Ping));
        assert_eq!(bits.peek(), seen);
    }
}
