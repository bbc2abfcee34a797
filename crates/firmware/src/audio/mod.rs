//! Audio playback side of the firmware
//!
//! # Structure
//!
//! - `amp_feeder`: prepares chunks, syncs the loopback, feeds the amplifier
//! - `slots`: bounded pool of in-flight amplifier transfers
//!
//! # Dependency Injection
//!
//! The feeder targets the [`platform::amp::AmpOutput`] trait. The board
//! crate injects its SAI transmit driver; tests inject
//! `platform::mocks::MockAmpOutput`:
//!
//! ```rust,ignore
//! static SLOTS: AmpSlots = AmpSlots::new(AMP_WRITE_SLOTS);
//! static LOOPBACK: Loopback<CriticalSectionRawMutex, &Gpt> = Loopback::new(&GPT2);
//!
//! let mut feeder = AmpFeeder::new(sai_tx, &SLOTS, &LOOPBACK);
//! feeder.play(&mut prompt).await?;
//!
//! // SAI transmit-complete interrupt:
//! SLOTS.release();
//! ```

pub mod amp_feeder;
pub mod slots;

pub use amp_feeder::{chunk_len, AmpFeeder, FeedError, FeedOutcome, FeedStats, SLOT_SAMPLES};
pub use slots::AmpSlots;
