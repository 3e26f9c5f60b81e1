//! Output line abstraction.
//!
//! A line is a mono 16-bit PCM sink with a bounded device buffer. `write` blocks
//! until the device has accepted every sample, which is what paces the metronome.

use anyhow::Result;

/// Sample layout accepted by a line: mono, signed 16-bit, `sample_rate` Hz.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
}

impl PcmFormat {
    pub const CHANNELS: u16 = 1;
    pub const BYTES_PER_SAMPLE: usize = 2;

    pub fn mono(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

/// A single output stream to the audio device.
///
/// Lines start closed. The expected lifecycle is
/// `open -> start -> write* -> (drain) -> stop -> flush -> close`; `start`/`stop`
/// may be repeated on an open line.
pub trait OutputLine: Send {
    fn open(&mut self, format: PcmFormat) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Resume consumption of buffered samples by the device.
    fn start(&mut self) -> Result<()>;

    /// Queue `samples`, blocking until the device buffer has room for all of them.
    ///
    /// Fails when the line is closed or the device reported an error.
    fn write(&mut self, samples: &[i16]) -> Result<()>;

    /// Block until everything written so far has been played.
    fn drain(&mut self) -> Result<()>;

    /// Pause consumption; buffered samples are kept.
    fn stop(&mut self);

    /// Discard buffered samples that have not been played yet.
    fn flush(&mut self);

    fn close(&mut self);
}

/// Hands out independent lines on one output device.
pub trait LineFactory: Send + Sync {
    /// Format every line from this factory should be opened with.
    fn format(&self) -> PcmFormat;

    /// Acquire a new, closed line.
    fn create_line(&self) -> Result<Box<dyn OutputLine>>;
}
