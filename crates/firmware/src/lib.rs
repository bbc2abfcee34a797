//! Voice front-end firmware composition
//!
//! Wires the capture pipeline, the echo-reference loopback and the
//! amplifier playback path together. Board bring-up (clocks, pins, SAI/PDM
//! register drivers) lives in the board crate, which supplies the
//! `platform` trait implementations injected here.
//!
//! # Architecture
//!
//! ```text
//! Processing task ◄── FrameChannel ◄── ChannelSink
//!                                          ▲
//! capture IRQ ─► ReadyBits ─► MicTask ─────┘
//!                               │  fetch
//!                               ▼
//!                            Loopback ◄── write_chunk ── AmpFeeder ─► AmpOutput
//!                                                           ▲
//!                                     amp TX IRQ ─► AmpSlots┘
//! ```
//!
//! # Task Priorities
//!
//! | Context              | Work                                   |
//! |----------------------|----------------------------------------|
//! | capture interrupt    | `capture::handoff::on_completion_interrupt` |
//! | amp TX interrupt     | [`audio::AmpSlots::release`]          |
//! | mic task (high)      | `capture::MicTask::run`                |
//! | playback task (low)  | [`audio::AmpFeeder::play`]            |
//!
//! # Features
//!
//! - `hardware` - Build for the target (32 768 Hz tick, defmt)
//! - `defmt` - Enable defmt logging in every crate
//! - `std` - Enable standard library (host testing)

#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
// Upgrade relevant warns to deny; keep pedantic as warn (too noisy for firmware)
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Critical correctness: deny these
#![deny(clippy::await_holding_lock)] // holding a blocking Mutex across .await is a bug
#![deny(unsafe_op_in_unsafe_fn)]
// unsafe fn body is not implicitly unsafe block
// Logging discipline
#![warn(clippy::print_stdout)] // prefer defmt over println! in lib code
#![warn(clippy::dbg_macro)] // dbg! should not be left in committed code
// Intentional allows for this codebase:
#![allow(clippy::module_name_repetitions)] // common in Rust crates; not a real issue
#![allow(clippy::missing_errors_doc)] // most errors are self-explanatory
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(async_fn_in_trait)] // Embassy no_std: single-threaded, Send bounds not needed

pub mod audio;
pub mod frame_channel;

pub use audio::{AmpFeeder, AmpSlots, FeedError, FeedOutcome};
pub use frame_channel::{ChannelSink, FrameChannel, FRAME_QUEUE_DEPTH};
