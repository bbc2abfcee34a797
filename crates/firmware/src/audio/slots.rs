//! Amplifier transmit slot pool.
//!
//! Bounds how many chunks the amplifier DMA has queued. The feeder takes a
//! slot before each transfer; the transmit-complete interrupt gives it
//! back through [`AmpSlots::release`].

use core::future::poll_fn;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use core::task::Poll;

use embassy_sync::waitqueue::AtomicWaker;

/// Free-slot counter shared by the feeder task and the transmit interrupt.
pub struct AmpSlots {
    free: AtomicUsize,
    capacity: usize,
    abort: AtomicBool,
    waker: AtomicWaker,
}

impl AmpSlots {
    /// Pool with `capacity` free slots, suitable for a `static`.
    pub const fn new(capacity: usize) -> Self {
        Self {
            free: AtomicUsize::new(capacity),
            capacity,
            abort: AtomicBool::new(false),
            waker: AtomicWaker::new(),
        }
    }

    /// Slots in the pool.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots not currently held by a transfer.
    pub fn free(&self) -> usize {
        self.free.load(Ordering::Acquire)
    }

    /// `true` when no transfer is in flight.
    pub fn all_free(&self) -> bool {
        self.free() == self.capacity
    }

    /// Take a slot without waiting.
    pub fn try_acquire(&self) -> bool {
        self.free
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Wait for a free slot and take it.
    pub async fn acquire(&self) {
        poll_fn(|cx| {
            self.waker.register(cx.waker());
            if self.try_acquire() {
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        })
        .await;
    }

    /// Wait until every slot is back.
    pub async fn drained(&self) {
        poll_fn(|cx| {
            self.waker.register(cx.waker());
            if self.all_free() {
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        })
        .await;
    }

    /// Return a slot. Called from the transmit-complete interrupt.
    ///
    /// Extra releases are ignored once the pool is full.
    pub fn release(&self) {
        let capacity = self.capacity;
        let _ = self
            .free
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < capacity).then(|| n.saturating_add(1))
            });
        self.waker.wake();
    }

    /// Ask the current playback to stop after its in-flight chunk.
    pub fn request_abort(&self) {
        self.abort.store(true, Ordering::Release);
        self.waker.wake();
    }

    /// Consume a pending abort request.
    pub fn take_abort(&self) -> bool {
        self.abort.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    #[test]
    fn acquire_until_empty() {
        let slots = AmpSlots::new(2);
        assert!(slots.try_acquire());
        assert!(slots.try_acquire());
        assert!(!slots.try_acquire());
        assert_eq!(slots.free(), 0);
    }

    #[test]
    fn release_never_exceeds_capacity() {
        let slots = AmpSlots::new(2);
        slots.release();
        assert_eq!(slots.free(), 2);
        assert!(slots.try_acquire());
        slots.release();
        slots.release();
        assert!(slots.all_free());
    }

    #[test]
    fn drained_resolves_once_all_returned() {
        let slots = AmpSlots::new(1);
        block_on(slots.acquire());
        assert!(!slots.all_free());
        slots.release();
        block_on(slots.drained());
    }

    #[test]
    fn abort_is_consumed_once() {
        let slots = AmpSlots::new(1);
        slots.request_abort();
        assert!(slots.take_abort());
        assert!(!slots.take_abort());
    }
}
