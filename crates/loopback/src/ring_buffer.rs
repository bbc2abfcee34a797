//! Const-generic ring buffer for amplifier samples.
//!
//! `RingBuffer<N>` stores up to `N` `i16` samples without heap allocation.
//! The playback path writes whole chunks, the mic task reads one frame's
//! worth per capture period.
//!
//! # Constraints
//!
//! - Writes are all-or-nothing: a chunk either fits completely or the
//!   buffer is left untouched.
//! - Not interrupt-safe and not `Sync`. [`crate::Loopback`] keeps it behind
//!   an Embassy mutex together with the sync state.

use crate::error::LoopbackError;

/// A fixed-capacity ring buffer of `i16` amplifier samples.
pub struct RingBuffer<const N: usize> {
    buf: [i16; N],
    /// Index of the next slot to read from.
    read: usize,
    /// Index of the next slot to write to.
    write: usize,
    /// Number of valid samples currently held.
    count: usize,
}

impl<const N: usize> RingBuffer<N> {
    /// Create a new, empty ring buffer.
    ///
    /// `const` so the loopback can live in a `static`.
    pub const fn new() -> Self {
        Self {
            buf: [0i16; N],
            read: 0,
            write: 0,
            count: 0,
        }
    }

    /// Append `data`.
    ///
    /// # Errors
    ///
    /// [`LoopbackError::RingFull`] if `data` does not fit in the free space.
    #[allow(clippy::indexing_slicing)] // Safety: write < N invariant; data.len() <= N - count checked above
    #[allow(clippy::arithmetic_side_effects)] // Safety: wrap via % N; count + data.len() <= N
    pub fn write_slice(&mut self, data: &[i16]) -> Result<(), LoopbackError> {
        self.check_fits(data.len())?;
        for &sample in data {
            self.buf[self.write] = sample;
            self.write = (self.write + 1) % N;
        }
        self.count += data.len();
        Ok(())
    }

    /// Append `len` zero samples.
    ///
    /// # Errors
    ///
    /// [`LoopbackError::RingFull`] if `len` samples do not fit.
    #[allow(clippy::indexing_slicing)] // Safety: write < N invariant; len <= N - count checked above
    #[allow(clippy::arithmetic_side_effects)] // Safety: wrap via % N; count + len <= N
    pub fn write_silence(&mut self, len: usize) -> Result<(), LoopbackError> {
        self.check_fits(len)?;
        for _ in 0..len {
            self.buf[self.write] = 0;
            self.write = (self.write + 1) % N;
        }
        self.count += len;
        Ok(())
    }

    /// Read up to `out.len()` samples into `out`.
    ///
    /// Returns the number of samples read. Slots past that count are left
    /// untouched.
    #[allow(clippy::indexing_slicing)] // Safety: read < N invariant; only reads up to self.count samples
    #[allow(clippy::arithmetic_side_effects)] // Safety: wrap via % N; count -= n where n <= count
    pub fn read_slice(&mut self, out: &mut [i16]) -> usize {
        let n = out.len().min(self.count);
        for slot in out.iter_mut().take(n) {
            *slot = self.buf[self.read];
            self.read = (self.read + 1) % N;
        }
        self.count -= n;
        n
    }

    /// Drop everything buffered.
    pub fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
        self.count = 0;
    }

    /// Number of samples currently available to read.
    pub fn available(&self) -> usize {
        self.count
    }

    /// Samples that can still be written.
    #[allow(clippy::arithmetic_side_effects)] // Safety: count <= N invariant
    pub fn free(&self) -> usize {
        N - self.count
    }

    /// Maximum number of samples the buffer can hold.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// `true` when no samples are present.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// `true` when the buffer is completely full.
    pub fn is_full(&self) -> bool {
        self.count == N
    }

    fn check_fits(&self, len: usize) -> Result<(), LoopbackError> {
        let free = self.free();
        if len > free {
            return Err(LoopbackError::RingFull { len, free });
        }
        Ok(())
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let mut rb: RingBuffer<64> = RingBuffer::new();
        let data: [i16; 16] = core::array::from_fn(|i| i16::try_from(i).unwrap());
        rb.write_slice(&data).unwrap();
        let mut out = [0i16; 16];
        assert_eq!(rb.read_slice(&mut out), 16);
        assert_eq!(out, data);
        assert!(rb.is_empty());
    }

    #[test]
    fn full_write_is_rejected_untouched() {
        let mut rb: RingBuffer<8> = RingBuffer::new();
        rb.write_slice(&[1i16; 6]).unwrap();
        let err = rb.write_slice(&[2i16; 3]).unwrap_err();
        assert_eq!(err, LoopbackError::RingFull { len: 3, free: 2 });
        assert_eq!(rb.available(), 6);
    }

    #[test]
    fn wraps_around() {
        let mut rb: RingBuffer<8> = RingBuffer::new();
        rb.write_slice(&[1i16; 8]).unwrap();
        assert!(rb.is_full());
        let mut half = [0i16; 4];
        assert_eq!(rb.read_slice(&mut half), 4);
        rb.write_slice(&[2i16; 4]).unwrap();
        let mut rest = [0i16; 8];
        assert_eq!(rb.read_slice(&mut rest), 8);
        assert_eq!(&rest[..4], &[1i16; 4]);
        assert_eq!(&rest[4..], &[2i16; 4]);
    }

    #[test]
    fn silence_then_data_keeps_order() {
        let mut rb: RingBuffer<16> = RingBuffer::new();
        rb.write_silence(3).unwrap();
        rb.write_slice(&[7, -7]).unwrap();
        let mut out = [9i16; 6];
        assert_eq!(rb.read_slice(&mut out), 5);
        assert_eq!(out, [0, 0, 0, 7, -7, 9]);
    }

    #[test]
    fn clear_empties_and_frees() {
        let mut rb: RingBuffer<16> = RingBuffer::new();
        rb.write_slice(&[5i16; 10]).unwrap();
        rb.clear();
        assert!(rb.is_empty());
        assert_eq!(rb.free(), rb.capacity());
    }
}
