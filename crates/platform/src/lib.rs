//! Hardware Abstraction Layer (HAL) for the microphone capture pipeline
//!
//! This crate provides trait-based abstractions for the capture peripheral,
//! the timestamp timer and the amplifier, plus the domain newtypes and
//! configuration shared by every layer, enabling development and testing
//! without physical hardware.
//!
//! # Architecture Layers
//!
//! ```text
//! Composition root (firmware crate)
//!         ↓
//! Pipeline (capture, loopback)
//!         ↓
//! Platform HAL (this crate - trait abstractions)
//!         ↓
//! Hardware Layer (SAI/PDM receiver, eDMA, GPT)
//! ```
//!
//! # Abstractions
//!
//! - [`CaptureHardware`] / [`CompletionAck`] - receiver + DMA control
//! - [`FrameSink`] - downstream "frame ready" notification
//! - [`EchoReferenceSource`] - time-aligned speaker copy
//! - [`TickSource`] - free-running timestamp timer
//! - [`AmpOutput`] - amplifier transmit path
//! - [`dma`] - descriptor layout model
//!
//! # Features
//!
//! - `std`: Expose [`mocks`] outside this crate (for testing)
//! - `hardware`: Physical hardware implementations
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
// Pedantic lints suppressed for this hardware HAL crate:
#![allow(clippy::doc_markdown)] // register names in doc comments
#![allow(clippy::must_use_candidate)] // hardware accessors, callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(async_fn_in_trait)] // Embassy no_std: single-threaded, Send bounds not needed

pub mod amp;
pub mod audio_types;
pub mod capture;
pub mod clock;
pub mod dma;
pub mod mic_config;
pub mod mocks;

// Re-export main high-level traits
pub use amp::AmpOutput;
pub use capture::{
    CaptureHardware, CompletionAck, CompletionFlags, EchoReferenceSource, FrameSink,
    NoEchoReference,
};
pub use clock::TickSource;

// Re-export domain types
pub use audio_types::{ChannelMask, OutOfRangeError, Phase, SampleWidth, VolumePercent};
pub use dma::{DmaLayout, DmaTarget, SourceWrap};
pub use mic_config::{MicConfig, MicConfigError, MicSource};
