/// Reference output sample rate in Hz.
pub const SAMPLE_RATE_HZ: u32 = 44_100;

/// Length of the audible part of every beat.
pub const BEEP_MS: u32 = 100;

/// Peak amplitude of a synthesised beep (full signed 16-bit range).
pub const MAX_AMPLITUDE: f64 = i16::MAX as f64;

/// Parameters of one metronome session, captured by `PlaybackEngine::start`.
///
/// Changing the source of these values while a session runs has no effect
/// until the next start.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaybackConfig {
    /// Tempo in beats per minute.
    pub tempo_bpm: u32,
    /// Accent every N beats; `0` disables accents.
    pub accent_interval: u32,
    /// Pitch of the accented beep.
    pub accent_freq_hz: f32,
    /// Pitch of every other beep.
    pub freq_hz: f32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tempo_bpm: 120,
            accent_interval: 0,
            accent_freq_hz: 1760.0,
            freq_hz: 880.0,
        }
    }
}

/// The alarm is a very fast metronome played for a handful of beats.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlarmConfig {
    pub tempo_bpm: u32,
    pub freq_hz: f32,
    /// Number of beeps written per alarm.
    pub repeats: usize,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            tempo_bpm: 500,
            freq_hz: 3600.0,
            repeats: 7,
        }
    }
}

/// Engine tuning shared by the metronome and alarm workers.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Duration of the sine part of each beat.
    pub beep_ms: u32,
    /// Alarm sound.
    pub alarm: AlarmConfig,
    /// Alarms that may wait behind the one currently playing.
    pub alarm_backlog: usize,
    /// Capacity of the engine event channel.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            beep_ms: BEEP_MS,
            alarm: AlarmConfig::default(),
            alarm_backlog: 1,
            event_capacity: 64,
        }
    }
}
