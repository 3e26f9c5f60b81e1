//! Typed failures surfaced by the synthesis and engine layers.

/// Rejected tone parameters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToneError {
    #[error("tempo must give at least one sample per beat, got {0} bpm")]
    InvalidTempo(u32),

    #[error("frequency must be positive and finite, got {0} Hz")]
    InvalidFrequency(f32),

    #[error("sample rate must be positive")]
    InvalidSampleRate,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// `start` was called while a session is still running.
    #[error("metronome is already playing")]
    AlreadyPlaying,

    #[error(transparent)]
    Tone(#[from] ToneError),

    /// No output line could be acquired when the engine was built.
    #[error("no audio output available: {0:#}")]
    NoOutput(anyhow::Error),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}
