//! Sine-beep synthesis and streamed playback for the metronome.
//!
//! The crate is split the same way the playback path is:
//! - [`tone`] and [`volume`] are pure sample-buffer transforms
//! - [`line`] is the device boundary, with [`cpal_line`] as the real backend
//! - [`engine`] owns the metronome worker and the alarm worker

pub mod config;
pub mod cpal_line;
pub mod device;
pub mod engine;
pub mod error;
pub mod events;
pub mod line;
pub mod playback;
pub mod queue;
pub mod tone;
pub mod volume;

pub use config::{AlarmConfig, EngineConfig, PlaybackConfig};
pub use engine::{AlarmTrigger, PlaybackEngine, Transport};
pub use error::{EngineError, ToneError};
pub use events::{EngineEvent, SessionEnd};
pub use line::{LineFactory, OutputLine, PcmFormat};
pub use tone::{ToneBuffer, ToneGenerator, generate_beat};
pub use volume::{Volume, apply_volume};
