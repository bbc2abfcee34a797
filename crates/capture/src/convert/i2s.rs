//! Multiplexed PCM microphones.

use platform::audio_types::SampleWidth;
use platform::mic_config::{
    MicSource, FRAME_SAMPLES, HPF_CUTOFF_HZ, I2S_GAIN, MAX_MICS, PCM_SAMPLE_RATE_HZ,
};

use super::{channel_slice, check_raw, saturate_i16, FrameConverter, HighPassFilter};
use crate::error::CaptureError;

/// De-interleave, amplify and high-pass I2S slots.
///
/// 32-bit slots keep the top 16 bits after gain (`(x · 6) >> 16`); 16-bit
/// slots are amplified directly (`x · 6`). Both saturate.
#[derive(Debug, Clone)]
pub struct I2sConverter {
    width: SampleWidth,
    filters: [HighPassFilter; MAX_MICS],
}

impl I2sConverter {
    /// Converter for slots of `width`.
    #[must_use]
    pub fn new(width: SampleWidth) -> Self {
        Self {
            width,
            filters: [HighPassFilter::new(HPF_CUTOFF_HZ, PCM_SAMPLE_RATE_HZ); MAX_MICS],
        }
    }

    /// Slot width this converter decodes.
    #[must_use]
    pub fn width(&self) -> SampleWidth {
        self.width
    }

    #[allow(clippy::arithmetic_side_effects)] // Safety: i64 holds i32 × 6 without overflow
    fn amplify(&self, slot: &[u8]) -> i16 {
        match (self.width, slot) {
            (SampleWidth::Bytes4, &[a, b, c, d]) => {
                let x = i64::from(i32::from_le_bytes([a, b, c, d]));
                saturate_i16((x * i64::from(I2S_GAIN)) >> 16)
            }
            (SampleWidth::Bytes2, &[a, b]) => {
                let x = i64::from(i16::from_le_bytes([a, b]));
                saturate_i16(x * i64::from(I2S_GAIN))
            }
            _ => 0,
        }
    }
}

impl FrameConverter for I2sConverter {
    #[allow(clippy::arithmetic_side_effects)] // Safety: channels <= 4, sizes <= 160 × 4 × 4
    fn convert(
        &mut self,
        raw: &[u8],
        channels: usize,
        first_channel: usize,
        out: &mut [i16],
    ) -> Result<(), CaptureError> {
        let width = self.width.bytes();
        check_raw(raw, FRAME_SAMPLES * channels * width)?;

        for lane in 0..channels {
            let channel = first_channel + lane;
            let pcm = channel_slice(out, channel)?;
            let slots = raw.chunks_exact(width).skip(lane).step_by(channels);
            for (dst, slot) in pcm.iter_mut().zip(slots) {
                *dst = self.amplify(slot);
            }
            if let Some(filter) = self.filters.get_mut(channel) {
                filter.process(pcm);
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        for filter in &mut self.filters {
            filter.reset();
        }
    }

    fn required_workspace(&self) -> usize {
        0
    }

    fn accepts(&self, source: MicSource) -> bool {
        matches!(source, MicSource::I2s { width } if width == self.width)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn interleave_i32(lanes: &[[i32; FRAME_SAMPLES]]) -> heapless::Vec<u8, 2560> {
        let mut raw = heapless::Vec::new();
        for i in 0..FRAME_SAMPLES {
            for lane in lanes {
                raw.extend_from_slice(&lane[i].to_le_bytes()).unwrap();
            }
        }
        raw
    }

    // ── Test A ────────────────────────────────────────────────────────────────
    /// 32-bit slots: gain then >> 16, routed to the right channel.
    #[test]
    fn test_deinterleaves_and_scales_32bit() {
        let lane0 = [0x0001_0000i32; FRAME_SAMPLES]; // → 6
        let lane1 = [-0x0002_0000i32; FRAME_SAMPLES]; // → -12
        let raw = interleave_i32(&[lane0, lane1]);

        let mut conv = I2sConverter::new(SampleWidth::Bytes4);
        let mut out = [0i16; FRAME_SAMPLES * 2];
        conv.convert(&raw, 2, 0, &mut out).unwrap();

        // First sample of each channel bypasses the filter.
        assert_eq!(out[0], 6);
        assert_eq!(out[FRAME_SAMPLES], -12);
    }

    // ── Test B ────────────────────────────────────────────────────────────────
    /// 16-bit slots saturate instead of wrapping.
    #[test]
    fn test_16bit_gain_saturates() {
        let mut raw = heapless::Vec::<u8, 320>::new();
        for _ in 0..FRAME_SAMPLES {
            raw.extend_from_slice(&10_000i16.to_le_bytes()).unwrap();
        }
        let mut conv = I2sConverter::new(SampleWidth::Bytes2);
        let mut out = [0i16; FRAME_SAMPLES];
        conv.convert(&raw, 1, 0, &mut out).unwrap();
        assert_eq!(out[0], i16::MAX);
    }

    // ── Test C ────────────────────────────────────────────────────────────────
    /// A second group lands after the first group's channels.
    #[test]
    fn test_first_channel_offsets_output() {
        let raw = interleave_i32(&[[0x0001_0000; FRAME_SAMPLES]]);
        let mut conv = I2sConverter::new(SampleWidth::Bytes4);
        let mut out = [0i16; FRAME_SAMPLES * 3];
        conv.convert(&raw, 1, 2, &mut out).unwrap();
        assert!(out[..FRAME_SAMPLES * 2].iter().all(|&s| s == 0));
        assert_eq!(out[FRAME_SAMPLES * 2], 6);
    }

    // ── Test D ────────────────────────────────────────────────────────────────
    /// Short raw input is rejected.
    #[test]
    fn test_short_raw_rejected() {
        let mut conv = I2sConverter::new(SampleWidth::Bytes4);
        let mut out = [0i16; FRAME_SAMPLES];
        assert!(matches!(
            conv.convert(&[0u8; 16], 1, 0, &mut out),
            Err(CaptureError::BufferTooSmall { .. })
        ));
    }

    // ── Test E ────────────────────────────────────────────────────────────────
    /// reset() re-primes every channel filter.
    #[test]
    fn test_reset_reprimes_filters() {
        let raw = interleave_i32(&[[0x0010_0000; FRAME_SAMPLES]]);
        let mut conv = I2sConverter::new(SampleWidth::Bytes4);
        let mut out = [0i16; FRAME_SAMPLES];
        conv.convert(&raw, 1, 0, &mut out).unwrap();
        conv.convert(&raw, 1, 0, &mut out).unwrap();
        assert!(out[0] < 96);

        conv.reset();
        conv.convert(&raw, 1, 0, &mut out).unwrap();
        assert_eq!(out[0], 96);
    }
}
