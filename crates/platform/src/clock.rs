//! Free-running timestamp timer.

/// Hardware tick counter shared by the capture interrupt and the playback path.
///
/// The counter wraps at `u32::MAX`; consumers must use wrap-aware deltas.
pub trait TickSource {
    /// Current counter value.
    fn now(&self) -> u32;
}

impl<T: TickSource + ?Sized> TickSource for &T {
    fn now(&self) -> u32 {
        (**self).now()
    }
}
