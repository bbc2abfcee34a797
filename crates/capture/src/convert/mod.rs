//! Raw capture → 16 kHz `i16` PCM.
//!
//! A converter turns one raw half-buffer of one capture group into the
//! group's slice of the channel-major PCM frame:
//!
//! ```text
//! raw (interleaved by lane)          pcm (channel-major, FRAME_SAMPLES each)
//! ┌───┬───┬───┬───┬───┬──          ┌─────────────┬─────────────┬──
//! │m0 │m1 │m0 │m1 │m0 │…    ──►    │ channel 0   │ channel 1   │ …
//! └───┴───┴───┴───┴───┴──          └─────────────┴─────────────┴──
//! ```
//!
//! Filter state persists per PCM channel across frames and is cleared by
//! [`FrameConverter::reset`].

mod decimator;
mod hpf;
mod i2s;

pub use decimator::{Decimator, PdmConverter, PrecisionDecimator, ScratchDecimator};
pub use hpf::HighPassFilter;
pub use i2s::I2sConverter;

use platform::mic_config::{MicSource, FRAME_SAMPLES};

use crate::error::CaptureError;

/// Conversion of one capture group's raw half into PCM.
pub trait FrameConverter {
    /// Convert `raw` (lane-interleaved, `channels` lanes) into channels
    /// `first_channel..first_channel + channels` of the channel-major `out`.
    ///
    /// # Errors
    ///
    /// [`CaptureError::BufferTooSmall`] if `raw` is shorter than one frame or
    /// `out` cannot hold the addressed channels.
    fn convert(
        &mut self,
        raw: &[u8],
        channels: usize,
        first_channel: usize,
        out: &mut [i16],
    ) -> Result<(), CaptureError>;

    /// Forget all filter history.
    fn reset(&mut self);

    /// Working memory the converter needs, in bytes.
    fn required_workspace(&self) -> usize;

    /// `true` if this converter decodes what `source` delivers.
    fn accepts(&self, source: MicSource) -> bool;
}

/// Clamp to the `i16` range.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // Safety: clamped to i16 range first
pub(crate) fn saturate_i16(value: i64) -> i16 {
    value.clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16
}

/// PCM slice of `channel` within a channel-major frame.
#[allow(clippy::arithmetic_side_effects)] // Safety: channel < MAX_MICS, product <= 640
pub(crate) fn channel_slice(out: &mut [i16], channel: usize) -> Result<&mut [i16], CaptureError> {
    let start = channel * FRAME_SAMPLES;
    let capacity = out.len();
    out.get_mut(start..start + FRAME_SAMPLES)
        .ok_or(CaptureError::BufferTooSmall {
            required: (start + FRAME_SAMPLES) * core::mem::size_of::<i16>(),
            capacity: capacity * core::mem::size_of::<i16>(),
        })
}

/// Fail unless `raw` holds `required` bytes.
pub(crate) fn check_raw(raw: &[u8], required: usize) -> Result<(), CaptureError> {
    if raw.len() < required {
        return Err(CaptureError::BufferTooSmall {
            required,
            capacity: raw.len(),
        });
    }
    Ok(())
}
