//! PDM bitstream decimation.
//!
//! Every output sample consumes [`PDM_OVERSAMPLE_WORDS`] 32-bit words, i.e.
//! 128 one-bit samples at 2.048 MHz, MSB first. Two strategies:
//!
//! | Strategy               | Filter chain                                   |
//! |------------------------|------------------------------------------------|
//! | [`PrecisionDecimator`] | CIC⁴ (R = 128) → normalize → biquad HPF → ×10   |
//! | [`ScratchDecimator`]   | popcount boxcar → ×4 → first-order HPF         |
//!
//! The strategy is picked at composition time by the `D` parameter of
//! [`PdmConverter`].

use biquad::{Biquad, Coefficients, DirectForm2Transposed, Hertz, Type, Q_BUTTERWORTH_F32};
use platform::mic_config::{
    MicSource, FRAME_SAMPLES, HPF_CUTOFF_HZ, MAX_MICS, PCM_SAMPLE_RATE_HZ, PDM_OVERSAMPLE_WORDS,
    PDM_PRECISION_GAIN, PDM_SCRATCH_GAIN,
};

use super::{channel_slice, check_raw, saturate_i16, FrameConverter, HighPassFilter};
use crate::error::CaptureError;

/// One-bit samples per output sample.
const BITS_PER_SAMPLE: i32 = 128;

/// CIC stages.
const CIC_ORDER: usize = 4;

/// CIC gain, `R^N` = 128⁴.
const CIC_FULL_SCALE: f32 = 268_435_456.0;

/// Bytes per PDM word.
const WORD_BYTES: usize = 4;

/// Single-channel PDM → PCM decimation.
pub trait Decimator: Sized + Clone {
    /// Build the strategy with its filters designed.
    ///
    /// # Errors
    ///
    /// [`CaptureError::FilterDesign`] if coefficients cannot be designed.
    fn try_new() -> Result<Self, CaptureError>;

    /// Decimate `words` into `out`, one sample per [`PDM_OVERSAMPLE_WORDS`]
    /// words. Stops at whichever runs out first.
    fn decimate<I: Iterator<Item = u32>>(&mut self, words: I, out: &mut [i16]);

    /// Forget filter history.
    fn reset(&mut self);

    /// Working memory of one channel.
    #[must_use]
    fn workspace_bytes() -> usize {
        core::mem::size_of::<Self>()
    }
}

// ── Precision ───────────────────────────────────────────────────────────────

/// Fourth-order CIC followed by a second-order Butterworth high-pass.
#[derive(Clone)]
pub struct PrecisionDecimator {
    integrators: [i32; CIC_ORDER],
    combs: [i32; CIC_ORDER],
    coefficients: Coefficients<f32>,
    hpf: DirectForm2Transposed<f32>,
}

impl PrecisionDecimator {
    /// Run one output sample's worth of bits through the integrators, then
    /// the combs. Integer arithmetic wraps, which CIC relies on.
    #[allow(clippy::arithmetic_side_effects)] // Safety: bit < 32; seen <= 4; stages use wrapping_*
    fn cic(&mut self, words: &mut impl Iterator<Item = u32>) -> Option<i32> {
        let mut seen = 0;
        for word in words.take(PDM_OVERSAMPLE_WORDS) {
            seen += 1;
            for bit in (0..u32::BITS).rev() {
                let mut acc = if (word >> bit) & 1 == 1 { 1 } else { -1 };
                for stage in &mut self.integrators {
                    *stage = stage.wrapping_add(acc);
                    acc = *stage;
                }
            }
        }
        if seen < PDM_OVERSAMPLE_WORDS {
            return None;
        }

        let mut value = self.integrators.last().copied().unwrap_or_default();
        for delay in &mut self.combs {
            let diff = value.wrapping_sub(*delay);
            *delay = value;
            value = diff;
        }
        Some(value)
    }
}

impl Decimator for PrecisionDecimator {
    #[allow(clippy::cast_precision_loss)] // Safety: 16 kHz is exact in f32
    fn try_new() -> Result<Self, CaptureError> {
        let fs = Hertz::<f32>::from_hz(PCM_SAMPLE_RATE_HZ as f32).map_err(|_| CaptureError::FilterDesign)?;
        let f0 = Hertz::<f32>::from_hz(HPF_CUTOFF_HZ).map_err(|_| CaptureError::FilterDesign)?;
        let coefficients = Coefficients::<f32>::from_params(Type::HighPass, fs, f0, Q_BUTTERWORTH_F32)
            .map_err(|_| CaptureError::FilterDesign)?;
        Ok(Self {
            integrators: [0; CIC_ORDER],
            combs: [0; CIC_ORDER],
            coefficients,
            hpf: DirectForm2Transposed::<f32>::new(coefficients),
        })
    }

    #[allow(clippy::cast_precision_loss)] // Safety: CIC output is bounded by 2^28
    #[allow(clippy::arithmetic_side_effects)] // Safety: f32 only, no integer ops
    #[allow(clippy::cast_possible_truncation)] // Safety: float → int `as` saturates
    fn decimate<I: Iterator<Item = u32>>(&mut self, mut words: I, out: &mut [i16]) {
        for dst in out.iter_mut() {
            let Some(raw) = self.cic(&mut words) else {
                break;
            };
            let normalized = raw as f32 / CIC_FULL_SCALE;
            let filtered = self.hpf.run(normalized);
            *dst = (filtered * PDM_PRECISION_GAIN * f32::from(u16::MAX)) as i16;
        }
    }

    fn reset(&mut self) {
        self.integrators = [0; CIC_ORDER];
        self.combs = [0; CIC_ORDER];
        self.hpf = DirectForm2Transposed::<f32>::new(self.coefficients);
    }
}

// ── Scratch ─────────────────────────────────────────────────────────────────

/// Boxcar decimation by bit counting, followed by a first-order high-pass.
#[derive(Debug, Clone)]
pub struct ScratchDecimator {
    hpf: HighPassFilter,
}

impl Decimator for ScratchDecimator {
    fn try_new() -> Result<Self, CaptureError> {
        Ok(Self {
            hpf: HighPassFilter::new(HPF_CUTOFF_HZ, PCM_SAMPLE_RATE_HZ),
        })
    }

    #[allow(clippy::arithmetic_side_effects)] // Safety: ones <= 128, result fits i64
    #[allow(clippy::cast_possible_wrap)] // Safety: popcount of 4 words <= 128
    fn decimate<I: Iterator<Item = u32>>(&mut self, mut words: I, out: &mut [i16]) {
        let mut written = 0;
        for dst in out.iter_mut() {
            let mut seen = 0;
            let mut ones = 0i32;
            for word in words.by_ref().take(PDM_OVERSAMPLE_WORDS) {
                seen += 1;
                ones += word.count_ones() as i32;
            }
            if seen < PDM_OVERSAMPLE_WORDS {
                break;
            }
            let centered = i64::from((2 * ones - BITS_PER_SAMPLE) << 8);
            *dst = saturate_i16(centered * i64::from(PDM_SCRATCH_GAIN));
            written += 1;
        }
        if let Some(frame) = out.get_mut(..written) {
            self.hpf.process(frame);
        }
    }

    fn reset(&mut self) {
        self.hpf.reset();
    }
}

// ── Converter ───────────────────────────────────────────────────────────────

/// Lane-interleaved PDM words → channel-major PCM, one decimator per channel.
#[derive(Clone)]
pub struct PdmConverter<D: Decimator> {
    decimators: [D; MAX_MICS],
}

impl<D: Decimator> PdmConverter<D> {
    /// One `D` per supported channel.
    ///
    /// # Errors
    ///
    /// Propagates [`Decimator::try_new`].
    pub fn try_new() -> Result<Self, CaptureError> {
        let decimator = D::try_new()?;
        Ok(Self {
            decimators: core::array::from_fn(|_| decimator.clone()),
        })
    }
}

fn word(chunk: &[u8]) -> u32 {
    match chunk {
        &[a, b, c, d] => u32::from_le_bytes([a, b, c, d]),
        _ => 0,
    }
}

impl<D: Decimator> FrameConverter for PdmConverter<D> {
    #[allow(clippy::arithmetic_side_effects)] // Safety: channels <= 4, sizes <= 640 × 4 × 4
    fn convert(
        &mut self,
        raw: &[u8],
        channels: usize,
        first_channel: usize,
        out: &mut [i16],
    ) -> Result<(), CaptureError> {
        let words_per_lane = FRAME_SAMPLES * PDM_OVERSAMPLE_WORDS;
        check_raw(raw, words_per_lane * channels * WORD_BYTES)?;

        for lane in 0..channels {
            let channel = first_channel + lane;
            let pcm = channel_slice(out, channel)?;
            let words = raw
                .chunks_exact(WORD_BYTES)
                .skip(lane)
                .step_by(channels)
                .take(words_per_lane)
                .map(word);
            if let Some(decimator) = self.decimators.get_mut(channel) {
                decimator.decimate(words, pcm);
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        for decimator in &mut self.decimators {
            decimator.reset();
        }
    }

    #[allow(clippy::arithmetic_side_effects)] // Safety: small struct size × 4
    fn required_workspace(&self) -> usize {
        D::workspace_bytes() * MAX_MICS
    }

    fn accepts(&self, source: MicSource) -> bool {
        source == MicSource::Pdm
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    /// PDM words whose ones-density is `density` (0..=32 ones per word).
    fn pdm_lane(density: u32) -> impl Iterator<Item = u32> + Clone {
        let word = if density == 0 { 0 } else { u32::MAX >> (32 - density) };
        core::iter::repeat(word)
    }

    // ── Test A ────────────────────────────────────────────────────────────────
    /// Scratch: half density decodes to silence, full density to +rail.
    #[test]
    fn test_scratch_density_mapping() {
        let mut d = ScratchDecimator::try_new().unwrap();
        let mut out = [1i16; 4];
        d.decimate(pdm_lane(16).take(16), &mut out);
        assert_eq!(out, [0; 4]);

        let mut d = ScratchDecimator::try_new().unwrap();
        let mut out = [0i16; 1];
        d.decimate(pdm_lane(32).take(4), &mut out);
        assert_eq!(out[0], i16::MAX);
    }

    // ── Test B ────────────────────────────────────────────────────────────────
    /// Short input leaves the tail untouched.
    #[test]
    fn test_scratch_partial_input() {
        let mut d = ScratchDecimator::try_new().unwrap();
        let mut out = [7i16; 3];
        d.decimate(pdm_lane(16).take(6), &mut out);
        assert_eq!(out, [0, 7, 7]);
    }

    // ── Test C ────────────────────────────────────────────────────────────────
    /// Precision: a constant density is DC, which the high-pass removes.
    #[test]
    fn test_precision_blocks_dc() {
        let mut d = PrecisionDecimator::try_new().unwrap();
        let mut out = [0i16; FRAME_SAMPLES];
        for _ in 0..50 {
            d.decimate(pdm_lane(20).take(FRAME_SAMPLES * PDM_OVERSAMPLE_WORDS), &mut out);
        }
        assert!(out.iter().all(|s| s.abs() < 64), "residual DC: {:?}", &out[..4]);
    }

    // ── Test D ────────────────────────────────────────────────────────────────
    /// Precision: a density step produces a transient of the right sign.
    #[test]
    fn test_precision_step_sign() {
        let mut d = PrecisionDecimator::try_new().unwrap();
        let mut out = [0i16; FRAME_SAMPLES];
        for _ in 0..20 {
            d.decimate(pdm_lane(16).take(FRAME_SAMPLES * PDM_OVERSAMPLE_WORDS), &mut out);
        }
        d.decimate(pdm_lane(18).take(FRAME_SAMPLES * PDM_OVERSAMPLE_WORDS), &mut out);
        assert!(out[8..].iter().take(16).all(|&s| s > 0));
    }

    // ── Test E ────────────────────────────────────────────────────────────────
    /// Converter routes lanes to channels and reports its workspace.
    #[test]
    fn test_converter_routes_lanes() {
        let words_per_lane = FRAME_SAMPLES * PDM_OVERSAMPLE_WORDS;
        let mut raw = heapless::Vec::<u8, { 640 * 2 * 4 }>::new();
        for _ in 0..words_per_lane {
            raw.extend_from_slice(&u32::MAX.to_le_bytes()).unwrap(); // lane 0: +rail
            raw.extend_from_slice(&0u32.to_le_bytes()).unwrap(); // lane 1: −rail
        }
        let mut conv = PdmConverter::<ScratchDecimator>::try_new().unwrap();
        let mut out = [0i16; FRAME_SAMPLES * 2];
        conv.convert(&raw, 2, 0, &mut out).unwrap();
        assert_eq!(out[0], i16::MAX);
        assert_eq!(out[FRAME_SAMPLES], i16::MIN);

        assert_eq!(
            conv.required_workspace(),
            ScratchDecimator::workspace_bytes() * MAX_MICS
        );
    }

    // ── Test F ────────────────────────────────────────────────────────────────
    /// Both strategies fit the reserved decimator workspace.
    #[test]
    fn test_workspace_fits_reservation() {
        use platform::mic_config::DECIMATOR_WORKSPACE_BYTES;
        let precision = PdmConverter::<PrecisionDecimator>::try_new().unwrap();
        let scratch = PdmConverter::<ScratchDecimator>::try_new().unwrap();
        assert!(precision.required_workspace() <= DECIMATOR_WORKSPACE_BYTES);
        assert!(scratch.required_workspace() <= DECIMATOR_WORKSPACE_BYTES);
    }
}
