//! Channel-mask → DMA descriptor layout.
//!
//! Six lane patterns can be served by one minor loop over the 16-byte FIFO
//! window (`R` = element width, 2 or 4 bytes):
//!
//! | Pattern                      | Burst | Stride | Return path            |
//! |------------------------------|-------|--------|------------------------|
//! | one lane                     | R     | 0      | none                   |
//! | two adjacent (0-1, 1-2, 2-3) | 2R    | 4      | minor-loop offset −8   |
//! | two apart (0-2, 1-3)         | 2R    | 8      | 16-byte source modulo  |
//! | three adjacent (0-2, 1-3)    | 3R    | 4      | minor-loop offset −12  |
//! | all four                     | 4R    | 4      | 16-byte source modulo  |
//!
//! Anything else (`0-3`, `0-1-3`, `0-2-3`) is a wiring mismatch and rejected.
//! 16-bit elements read the upper half of each FIFO word, so the source
//! start is shifted by 2.

use platform::audio_types::{ChannelMask, SampleWidth};
use platform::dma::{DmaLayout, SourceWrap, FIFO_WINDOW_BYTES, LANE_STRIDE_BYTES};

use crate::error::CaptureError;

/// Derive the descriptor layout for `mask`.
///
/// `samples_per_frame` is the number of minor loops per half-buffer.
///
/// # Errors
///
/// [`CaptureError::UnsupportedChannelMask`] for lane patterns outside the
/// table above, [`CaptureError::InvalidFrameLength`] if the frame does not
/// fit a 16-bit major count.
#[allow(clippy::arithmetic_side_effects)] // Safety: lane < 4, count <= 4, width <= 4; all products < 64
#[allow(clippy::cast_possible_truncation)] // Safety: width and count are single digits
pub fn derive_layout(
    mask: ChannelMask,
    width: SampleWidth,
    samples_per_frame: usize,
) -> Result<DmaLayout, CaptureError> {
    let major_count = u16::try_from(samples_per_frame)
        .ok()
        .filter(|&n| n > 0)
        .ok_or(CaptureError::InvalidFrameLength {
            samples: samples_per_frame,
        })?;

    let (source_stride, wrap) = match (mask.count(), mask.bits()) {
        (1, _) => (0, SourceWrap::None),
        (2, 0b0011 | 0b0110 | 0b1100) => (LANE_STRIDE_BYTES, SourceWrap::MinorLoopOffset(-8)),
        (2, 0b0101 | 0b1010) => (
            2 * LANE_STRIDE_BYTES,
            SourceWrap::Modulo {
                bytes: FIFO_WINDOW_BYTES,
            },
        ),
        (3, 0b0111 | 0b1110) => (LANE_STRIDE_BYTES, SourceWrap::MinorLoopOffset(-12)),
        (4, _) => (
            LANE_STRIDE_BYTES,
            SourceWrap::Modulo {
                bytes: FIFO_WINDOW_BYTES,
            },
        ),
        _ => return Err(CaptureError::UnsupportedChannelMask { mask: mask.bits() }),
    };

    let element = width.bytes() as u32;
    let upper_half = match width {
        SampleWidth::Bytes2 => 2,
        SampleWidth::Bytes4 => 0,
    };

    Ok(DmaLayout {
        source_start: u32::from(mask.lowest()) * LANE_STRIDE_BYTES + upper_half,
        element: width,
        minor_loop_bytes: element * mask.count() as u32,
        source_stride,
        wrap,
        dest_stride: element,
        major_count,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn mask(bits: u8) -> ChannelMask {
        ChannelMask::try_new(bits).unwrap()
    }

    #[test]
    fn adjacent_pair_uses_negative_offset() {
        let layout = derive_layout(mask(0b0110), SampleWidth::Bytes4, 160).unwrap();
        assert_eq!(layout.source_start, 4);
        assert_eq!(layout.minor_loop_bytes, 8);
        assert_eq!(layout.source_stride, 4);
        assert_eq!(layout.wrap, SourceWrap::MinorLoopOffset(-8));
        assert_eq!(layout.dest_stride, 4);
        assert_eq!(layout.major_count, 160);
        assert_eq!(layout.half_bytes(), 160 * 2 * 4);
    }

    #[test]
    fn split_pair_uses_modulo() {
        let layout = derive_layout(mask(0b1010), SampleWidth::Bytes4, 160).unwrap();
        assert_eq!(layout.source_stride, 8);
        assert_eq!(layout.wrap, SourceWrap::Modulo { bytes: 16 });
    }

    #[test]
    fn three_adjacent_uses_minus_twelve() {
        let layout = derive_layout(mask(0b1110), SampleWidth::Bytes2, 160).unwrap();
        assert_eq!(layout.minor_loop_bytes, 6);
        assert_eq!(layout.wrap, SourceWrap::MinorLoopOffset(-12));
        assert_eq!(layout.source_start, 4 + 2);
    }

    #[test]
    fn single_lane_never_moves() {
        let layout = derive_layout(mask(0b1000), SampleWidth::Bytes4, 160).unwrap();
        assert_eq!(layout.source_stride, 0);
        assert_eq!(layout.wrap, SourceWrap::None);
        assert_eq!(layout.source_start, 12);
    }

    #[test]
    fn sixteen_bit_reads_upper_half() {
        let layout = derive_layout(mask(0b0001), SampleWidth::Bytes2, 160).unwrap();
        assert_eq!(layout.source_start, 2);
        assert_eq!(layout.dest_stride, 2);
    }

    #[test]
    fn unsupported_patterns_rejected() {
        for bits in [0b1001, 0b1011, 0b1101] {
            assert_eq!(
                derive_layout(mask(bits), SampleWidth::Bytes4, 160),
                Err(CaptureError::UnsupportedChannelMask { mask: bits })
            );
        }
    }

    #[test]
    fn oversized_frame_rejected() {
        assert_eq!(
            derive_layout(mask(0b0001), SampleWidth::Bytes4, 70_000),
            Err(CaptureError::InvalidFrameLength { samples: 70_000 })
        );
    }

    #[test]
    fn pdm_frame_fits_major_count() {
        let layout = derive_layout(mask(0b0011), SampleWidth::Bytes4, 640).unwrap();
        assert_eq!(layout.major_count, 640);
        let (lanes, next) = layout.visit_order();
        assert_eq!(lanes.as_slice(), &[0, 1]);
        assert_eq!(next, layout.source_start);
        assert_eq!(lanes[0], 0);
    }
}
