//! Echo-reference loopback
//!
//! Keeps a delay-compensated copy of what the amplifier plays so the mic
//! task can fetch, for every captured frame, the speaker signal that was
//! playing at the same moment.
//!
//! # Data flow
//!
//! ```text
//! feeder ─► apply_volume_differential ─► FirLowPass ─► amplifier
//!                                            │
//!                                            └─► Loopback::write_chunk ─► ring (48 kHz)
//!                                                                           │
//! mic task ◄── downsample_48k_to_16k ◄── EchoReferenceSource::fetch ◄──────┘
//! ```
//!
//! # Modules
//!
//! - [`ring_buffer`] - fixed-capacity sample ring
//! - [`sync`] - Disabled / NeedSync / Enabled state machine
//! - [`delay`] - tick deltas and session padding
//! - [`downsample`] - 48 kHz pairs → 16 kHz
//! - [`differential`] - volume, differential encoding, FIR low-pass
//! - [`reference`] - the shared [`Loopback`]
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

pub mod delay;
pub mod differential;
pub mod downsample;
pub mod error;
pub mod reference;
pub mod ring_buffer;
pub mod sync;

pub use delay::{tick_delta, ticks_to_us, Padding, MAX_PADDING_BYTES};
pub use differential::{apply_volume_differential, FirLowPass};
pub use downsample::downsample_48k_to_16k;
pub use error::LoopbackError;
pub use reference::{ChunkOutcome, Loopback, LoopbackStats, LOOPBACK_RING_SAMPLES};
pub use ring_buffer::RingBuffer;
pub use sync::{LoopbackState, SyncState};
