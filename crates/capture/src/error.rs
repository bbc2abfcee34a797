//! Capture pipeline errors.
//!
//! Everything here is either a bring-up failure (wrong wiring, undersized
//! statics) returned to the caller that builds the mic task, or a stop that
//! did not quiesce. Transient stalls and overruns never surface as errors;
//! the mic task absorbs them.

use platform::mic_config::MicConfigError;
use thiserror_no_std::Error;

/// Errors returned while configuring or controlling capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CaptureError {
    /// The lane pattern cannot be read by a single DMA minor loop.
    #[error("channel mask {mask:#06b} has no DMA layout")]
    UnsupportedChannelMask {
        /// Offending bit pattern.
        mask: u8,
    },
    /// The converter cannot decode the configured microphone front end.
    #[error("converter does not match the configured mic source")]
    ConverterMismatch,
    /// The conversion strategy needs more working memory than reserved.
    #[error("decimator needs {required} bytes, {available} reserved")]
    WorkspaceTooSmall {
        /// Bytes the strategy asked for.
        required: usize,
        /// Bytes reserved at build time.
        available: usize,
    },
    /// A required collaborator was not supplied to the builder.
    #[error("mic task built without {0}")]
    MissingCollaborator(&'static str),
    /// The receiver still reported enabled after the bounded poll.
    #[error("receiver still active after {polls} polls")]
    NotQuiesced {
        /// Polls performed.
        polls: u32,
    },
    /// A capture half is smaller than one frame of raw data.
    #[error("capture half holds {capacity} bytes, frame needs {required}")]
    BufferTooSmall {
        /// Bytes one frame needs.
        required: usize,
        /// Bytes the half provides.
        capacity: usize,
    },
    /// Samples per frame do not fit a DMA major loop counter.
    #[error("{samples} samples per frame exceed the DMA major count")]
    InvalidFrameLength {
        /// Requested samples per lane.
        samples: usize,
    },
    /// More capture groups than the task supports.
    #[error("too many capture groups")]
    TooManyGroups,
    /// `start()` before `configure()`.
    #[error("driver started before configure()")]
    NotConfigured,
    /// Filter coefficients could not be designed for the configured rate.
    #[error("filter design failed")]
    FilterDesign,
    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    Config(MicConfigError),
}

impl From<MicConfigError> for CaptureError {
    fn from(err: MicConfigError) -> Self {
        Self::Config(err)
    }
}
