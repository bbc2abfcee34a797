//! 48 kHz differential amplifier feed → 16 kHz echo reference.
//!
//! One 10 ms amplifier frame is 480 samples of differential pairs
//! `[s, −s, s, −s, …]`. Keeping the first sample of each pair gives
//! 240 samples at 24 kHz; every three of those become two outputs by
//! averaging neighbours:
//!
//! ```text
//! pairs   a -a  b -b  c -c
//! out0 =  a/2 + b/2
//! out1 =  b/2 + c/2
//! ```

use platform::mic_config::{FRAME_SAMPLES, PCM_AMP_SAMPLE_COUNT};

/// Amplifier samples consumed per echo frame.
pub const AMP_FRAME_SAMPLES: usize = PCM_AMP_SAMPLE_COUNT;

/// Echo samples produced per frame.
pub const ECHO_FRAME_SAMPLES: usize = FRAME_SAMPLES;

/// Downsample `input` (48 kHz pairs) into `out` (16 kHz).
///
/// Six input samples yield two outputs; whichever slice runs out first
/// ends the conversion. Halving happens before the sum, truncating toward
/// zero, so the result never overflows.
#[allow(clippy::arithmetic_side_effects)] // Safety: halved i16 values cannot overflow when added; divisor is a non-zero constant
pub fn downsample_48k_to_16k(input: &[i16], out: &mut [i16]) {
    for (six, two) in input.chunks_exact(6).zip(out.chunks_exact_mut(2)) {
        let ([a, _, b, _, c, _], [o0, o1]) = (six, two) else {
            continue;
        };
        *o0 = *a / 2 + *b / 2;
        *o1 = *b / 2 + *c / 2;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn differential(values: &[i16]) -> [i16; AMP_FRAME_SAMPLES] {
        let mut frame = [0i16; AMP_FRAME_SAMPLES];
        for (pair, &v) in frame.chunks_exact_mut(2).zip(values.iter().cycle()) {
            pair[0] = v;
            pair[1] = v.saturating_neg();
        }
        frame
    }

    #[test]
    fn constant_input_passes_through() {
        let input = differential(&[1000]);
        let mut out = [0i16; ECHO_FRAME_SAMPLES];
        downsample_48k_to_16k(&input, &mut out);
        assert!(out.iter().all(|&s| s == 1000));
    }

    #[test]
    fn averages_neighbouring_pairs() {
        let input = differential(&[10, 20, 31]);
        let mut out = [0i16; ECHO_FRAME_SAMPLES];
        downsample_48k_to_16k(&input, &mut out);
        // 10/2 + 20/2 = 15, 20/2 + 31/2 = 10 + 15 = 25
        assert_eq!(&out[..4], &[15, 25, 15, 25]);
    }

    #[test]
    fn extremes_do_not_overflow() {
        let input = differential(&[i16::MAX]);
        let mut out = [0i16; ECHO_FRAME_SAMPLES];
        downsample_48k_to_16k(&input, &mut out);
        assert_eq!(out[0], 32_766);

        let input = differential(&[i16::MIN]);
        downsample_48k_to_16k(&input, &mut out);
        assert_eq!(out[0], i16::MIN);
    }

    #[test]
    fn one_frame_fills_one_echo_frame() {
        let input = differential(&[2]);
        let mut out = [0i16; ECHO_FRAME_SAMPLES + 2];
        downsample_48k_to_16k(&input, &mut out);
        assert!(out[..ECHO_FRAME_SAMPLES].iter().all(|&s| s == 2));
        assert_eq!(&out[ECHO_FRAME_SAMPLES..], &[0, 0]);
    }
}
