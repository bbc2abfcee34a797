//! Amplifier transmit path.

/// Transmit side of the speaker amplifier.
///
/// `transfer` queues one prepared chunk of 48 kHz differential samples and
/// returns once the chunk is handed to DMA. Completion is reported back to
/// the feeder separately, from the transmit interrupt.
pub trait AmpOutput {
    /// Error type returned by the transmit driver.
    type Error: core::fmt::Debug;

    /// Queue `samples` for playback.
    async fn transfer(&mut self, samples: &[i16]) -> Result<(), Self::Error>;
}
