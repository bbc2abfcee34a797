//! Audio domain newtypes for compile-time safety.
//!
//! These zero-cost abstractions prevent common capture-path errors:
//! - `ChannelMask`: only the four FIFO lanes of a receiver, never empty
//! - `SampleWidth`: 16- or 32-bit receiver slots, nothing else
//! - `Phase`: which half of a ping/pong pair, instead of a bare `0`/`1`
//! - `VolumePercent`: clamps 0–100 for the amplifier feed

// ── Error type ───────────────────────────────────────────────────────────────

/// Error returned when a value is out of the valid range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutOfRangeError {
    /// The value that was out of range.
    pub value: u32,
    /// The inclusive minimum allowed value.
    pub min: u32,
    /// The inclusive maximum allowed value.
    pub max: u32,
}

// ── ChannelMask ──────────────────────────────────────────────────────────────

/// Set of enabled receive channels on one capture peripheral.
///
/// Bit `n` enables FIFO lane `n`. A receiver has four lanes, so only the low
/// nibble is meaningful and at least one bit must be set. Whether the shape
/// of the mask can be served by a single DMA minor loop is decided later by
/// the capture driver; this type only guards the raw range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct ChannelMask(u8);

impl ChannelMask {
    /// Number of FIFO lanes a receiver exposes.
    pub const LANES: u8 = 4;

    /// Lanes 0 and 1, the usual dual-microphone wiring.
    pub const PAIR_01: Self = Self(0b0011);

    /// Create a mask, rejecting an empty mask or bits above lane 3.
    ///
    /// # Errors
    ///
    /// Returns [`OutOfRangeError`] if `bits == 0` or `bits > 0x0F`.
    pub fn try_new(bits: u8) -> Result<Self, OutOfRangeError> {
        if bits == 0 || bits > 0x0F {
            Err(OutOfRangeError {
                value: u32::from(bits),
                min: 0x01,
                max: 0x0F,
            })
        } else {
            Ok(Self(bits))
        }
    }

    /// Return the raw bit pattern.
    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Number of enabled channels (1–4).
    #[must_use]
    pub fn count(self) -> usize {
        self.0.count_ones() as usize
    }

    /// `true` if lane `lane` is enabled.
    #[must_use]
    pub fn contains(self, lane: u8) -> bool {
        lane < Self::LANES && self.0 & (1 << lane) != 0
    }

    /// Index of the lowest enabled lane.
    #[must_use]
    pub fn lowest(self) -> u8 {
        // Non-empty by construction, so trailing_zeros() < 8.
        self.0.trailing_zeros() as u8
    }

    /// Enabled lanes in increasing order.
    pub fn lanes(self) -> impl Iterator<Item = u8> {
        (0..Self::LANES).filter(move |&lane| self.contains(lane))
    }
}

// ── SampleWidth ──────────────────────────────────────────────────────────────

/// Width of one receiver slot as read by DMA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SampleWidth {
    /// 16-bit slot, upper half of the 32-bit FIFO word.
    Bytes2,
    /// Full 32-bit slot.
    Bytes4,
}

impl SampleWidth {
    /// Width in bytes.
    #[must_use]
    pub fn bytes(self) -> usize {
        match self {
            Self::Bytes2 => 2,
            Self::Bytes4 => 4,
        }
    }
}

// ── Phase ────────────────────────────────────────────────────────────────────

/// One half of a ping/pong buffer pair.
///
/// Hardware fills `Ping` then `Pong` then `Ping` again; software always
/// works on the half that hardware just finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// First half.
    Ping,
    /// Second half.
    Pong,
}

impl Phase {
    /// Both phases in capture order.
    pub const ALL: [Self; 2] = [Self::Ping, Self::Pong];

    /// Phase selected by a free-running toggle counter.
    #[must_use]
    pub fn from_toggle(counter: u32) -> Self {
        if counter & 1 == 0 {
            Self::Ping
        } else {
            Self::Pong
        }
    }

    /// 0 for `Ping`, 1 for `Pong`.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Ping => 0,
            Self::Pong => 1,
        }
    }

    /// The other half.
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::Ping => Self::Pong,
            Self::Pong => Self::Ping,
        }
    }
}

// ── VolumePercent ────────────────────────────────────────────────────────────

/// Volume as a percentage, clamped to 0–100.
///
/// Wraps a `u8` with the invariant `0 <= value <= 100`.
/// Construct with [`VolumePercent::new`] (clamping) or
/// [`VolumePercent::try_new`] (fallible, strict).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct VolumePercent(u8);

impl VolumePercent {
    /// Full scale, samples pass through unchanged.
    pub const FULL: Self = Self(100);

    /// Create a `VolumePercent`, clamping values above 100 to 100.
    #[must_use]
    pub fn new(value: u8) -> Self {
        Self(value.min(100))
    }

    /// Create a `VolumePercent`, returning an error if `value > 100`.
    ///
    /// # Errors
    ///
    /// Returns [`OutOfRangeError`] if `value > 100`.
    pub fn try_new(value: u8) -> Result<Self, OutOfRangeError> {
        if value > 100 {
            Err(OutOfRangeError {
                value: u32::from(value),
                min: 0,
                max: 100,
            })
        } else {
            Ok(Self(value))
        }
    }

    /// Return the inner volume value (0–100).
    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }

    /// Scale one PCM sample.
    ///
    /// Formula: `sample * volume / 100`, truncating toward zero.
    #[must_use]
    #[allow(clippy::arithmetic_side_effects)] // Safety: |i16| * 100 fits i32; divisor is a non-zero constant
    #[allow(clippy::cast_possible_truncation)] // Safety: |result| <= |sample| because volume <= 100
    pub fn scale(self, sample: i16) -> i16 {
        (i32::from(sample) * i32::from(self.0) / 100) as i16
    }
}
