//! Microphone capture pipeline
//!
//! Continuous ping/pong DMA capture from one or more receivers, conversion
//! to 16 kHz PCM and phase-tagged frame announcements, with the echo
//! reference fetched alongside each frame.
//!
//! # Data flow
//!
//! ```text
//! receiver ─DMA─► RawBuffer ──► converter ──► PcmBuffer ──notify──► consumer
//!     │                                          ▲
//!     └─ completion IRQ ─► ReadyBits ─► MicTask ─┤
//!                          (+ tick)              └── EchoReferenceSource ─► EchoBuffer
//! ```
//!
//! # Modules
//!
//! - [`layout`] - channel mask → DMA descriptor layout
//! - [`driver`] - configure / start / stop of one receiver
//! - [`handoff`] - interrupt → task ready bits
//! - [`convert`] - I2S and PDM converters
//! - [`mic_task`] - the task loop, mic on/off and stall recovery
//!
//! # Features
//!
//! - `defmt`: Enable defmt logging

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)] // unsafe fn body is not implicitly unsafe block
#![warn(clippy::print_stdout)] // prefer defmt over println! in lib code
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(async_fn_in_trait)] // Embassy no_std: single-threaded, Send bounds not needed

pub mod buffer;
pub mod convert;
pub mod driver;
pub mod error;
pub mod handoff;
pub mod layout;
pub mod mic_task;

pub use buffer::{EchoBuffer, PcmBuffer, PingPong, RawBuffer, PCM_FRAME_SAMPLES};
pub use convert::{
    Decimator, FrameConverter, HighPassFilter, I2sConverter, PdmConverter, PrecisionDecimator,
    ScratchDecimator,
};
pub use driver::CaptureDriver;
pub use error::CaptureError;
pub use handoff::{on_completion_interrupt, ReadyBits, HW_ERROR, OVERRUN};
pub use layout::derive_layout;
pub use mic_task::{CaptureStats, MicTask, MicTaskBuilder, StallState, StepEvent, TaskState};
