//! Shared application state.
//!
//! One [`Model`] lives behind an `Arc<Mutex<_>>` and is read by the UI, the
//! controller and the timer thread. The volume is a [`Volume`] handle shared
//! with the playback engine, so volume changes reach a running session without
//! going through this lock.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tone_player::{PlaybackConfig, Volume};

pub const MIN_TEMPO_BPM: u32 = 10;
pub const MAX_TEMPO_BPM: u32 = 300;
pub const MAX_TIMER_MINUTES: u32 = 99;
pub const MAX_TIMER_SECONDS: u32 = 59;
pub const MIN_FREQ_HZ: f32 = 20.0;
pub const MAX_FREQ_HZ: f32 = 20_000.0;

pub type SharedModel = Arc<Mutex<Model>>;

/// Lock the shared model, recovering the data if a holder panicked.
pub fn lock(model: &SharedModel) -> MutexGuard<'_, Model> {
    model.lock().unwrap_or_else(|e| e.into_inner())
}

/// Rejected user input. The model is left unchanged.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum InputError {
    #[error("not a number: {0:?}")]
    NotANumber(String),
    #[error("tempo must be between 10 and 300 BPM, got {0}")]
    TempoOutOfRange(i64),
    #[error("accent interval must not be negative, got {0}")]
    NegativeInterval(i64),
    #[error("frequency must be between 20 and 20000 Hz, got {0}")]
    FrequencyOutOfRange(f32),
    #[error("minutes must be between 0 and 99, got {0}")]
    MinutesOutOfRange(i64),
    #[error("seconds must be between 0 and 59, got {0}")]
    SecondsOutOfRange(i64),
    #[error("stop the timer before changing it")]
    TimerRunning,
}

/// Minutes and seconds left on the countdown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Countdown {
    minutes: u32,
    seconds: u32,
}

impl Countdown {
    pub fn new(minutes: u32, seconds: u32) -> Result<Self, InputError> {
        if minutes > MAX_TIMER_MINUTES {
            return Err(InputError::MinutesOutOfRange(i64::from(minutes)));
        }
        if seconds > MAX_TIMER_SECONDS {
            return Err(InputError::SecondsOutOfRange(i64::from(seconds)));
        }
        Ok(Self { minutes, seconds })
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    pub fn seconds(&self) -> u32 {
        self.seconds
    }

    pub fn is_zero(&self) -> bool {
        self.minutes == 0 && self.seconds == 0
    }

    pub fn total_seconds(&self) -> u32 {
        self.minutes * 60 + self.seconds
    }

    /// Take one second off, borrowing from the minutes. Stays at 00:00.
    pub fn decrement(&mut self) {
        if self.seconds > 0 {
            self.seconds -= 1;
        } else if self.minutes > 0 {
            self.minutes -= 1;
            self.seconds = MAX_TIMER_SECONDS;
        }
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.minutes, self.seconds)
    }
}

#[derive(Clone, Debug)]
pub struct Model {
    tempo_bpm: u32,
    accent_interval: u32,
    accent_freq_hz: f32,
    freq_hz: f32,
    timer: Countdown,
    saved_timer: Countdown,
    looping: bool,
    volume: Volume,
}

impl Default for Model {
    fn default() -> Self {
        Self::new(Volume::default())
    }
}

impl Model {
    pub fn new(volume: Volume) -> Self {
        let playback = PlaybackConfig::default();
        Self {
            tempo_bpm: playback.tempo_bpm,
            accent_interval: playback.accent_interval,
            accent_freq_hz: playback.accent_freq_hz,
            freq_hz: playback.freq_hz,
            timer: Countdown::default(),
            saved_timer: Countdown::default(),
            looping: false,
            volume,
        }
    }

    pub fn shared(self) -> SharedModel {
        Arc::new(Mutex::new(self))
    }

    /// Snapshot of the metronome settings for `PlaybackEngine::start`.
    pub fn playback_config(&self) -> PlaybackConfig {
        PlaybackConfig {
            tempo_bpm: self.tempo_bpm,
            accent_interval: self.accent_interval,
            accent_freq_hz: self.accent_freq_hz,
            freq_hz: self.freq_hz,
        }
    }

    pub fn tempo_bpm(&self) -> u32 {
        self.tempo_bpm
    }

    pub fn set_tempo_bpm(&mut self, bpm: u32) -> Result<(), InputError> {
        if !(MIN_TEMPO_BPM..=MAX_TEMPO_BPM).contains(&bpm) {
            return Err(InputError::TempoOutOfRange(i64::from(bpm)));
        }
        self.tempo_bpm = bpm;
        Ok(())
    }

    pub fn accent_interval(&self) -> u32 {
        self.accent_interval
    }

    /// `0` disables accents.
    pub fn set_accent_interval(&mut self, interval: u32) {
        self.accent_interval = interval;
    }

    pub fn accent_freq_hz(&self) -> f32 {
        self.accent_freq_hz
    }

    pub fn set_accent_freq_hz(&mut self, hz: f32) -> Result<(), InputError> {
        self.accent_freq_hz = check_freq(hz)?;
        Ok(())
    }

    pub fn freq_hz(&self) -> f32 {
        self.freq_hz
    }

    pub fn set_freq_hz(&mut self, hz: f32) -> Result<(), InputError> {
        self.freq_hz = check_freq(hz)?;
        Ok(())
    }

    pub fn timer(&self) -> Countdown {
        self.timer
    }

    pub fn set_timer(&mut self, timer: Countdown) {
        self.timer = timer;
    }

    pub fn set_timer_minutes(&mut self, minutes: u32) -> Result<(), InputError> {
        self.timer = Countdown::new(minutes, self.timer.seconds)?;
        Ok(())
    }

    pub fn set_timer_seconds(&mut self, seconds: u32) -> Result<(), InputError> {
        self.timer = Countdown::new(self.timer.minutes, seconds)?;
        Ok(())
    }

    pub fn time_up(&self) -> bool {
        self.timer.is_zero()
    }

    pub fn decrement_timer(&mut self) {
        self.timer.decrement();
    }

    /// Remember the current countdown so a looping timer can start over from it.
    pub fn save_timer(&mut self) {
        self.saved_timer = self.timer;
    }

    pub fn saved_timer(&self) -> Countdown {
        self.saved_timer
    }

    pub fn restore_saved_timer(&mut self) {
        self.timer = self.saved_timer;
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn volume(&self) -> f32 {
        self.volume.get()
    }

    /// Clamped to `[0.0, 1.0]`; takes effect from the next beat.
    pub fn set_volume(&mut self, level: f32) {
        self.volume.set(level);
    }

    pub fn volume_handle(&self) -> &Volume {
        &self.volume
    }
}

fn check_freq(hz: f32) -> Result<f32, InputError> {
    if (MIN_FREQ_HZ..=MAX_FREQ_HZ).contains(&hz) {
        Ok(hz)
    } else {
        Err(InputError::FrequencyOutOfRange(hz))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_factory_settings() {
        let model = Model::default();
        assert_eq!(model.tempo_bpm(), 120);
        assert_eq!(model.accent_interval(), 0);
        assert_eq!(model.accent_freq_hz(), 1760.0);
        assert_eq!(model.freq_hz(), 880.0);
        assert_eq!(model.timer(), Countdown::default());
        assert!(model.time_up());
        assert!(!model.is_looping());
        assert_eq!(model.volume(), 1.0);
    }

    #[test]
    fn decrement_borrows_from_minutes() {
        let mut t = Countdown::new(2, 0).unwrap();
        t.decrement();
        assert_eq!(t, Countdown::new(1, 59).unwrap());
        let mut t = Countdown::new(0, 1).unwrap();
        t.decrement();
        assert!(t.is_zero());
        t.decrement();
        assert!(t.is_zero());
    }

    #[test]
    fn countdown_displays_padded() {
        assert_eq!(Countdown::new(5, 7).unwrap().to_string(), "05:07");
        assert_eq!(Countdown::default().to_string(), "00:00");
        assert_eq!(Countdown::new(99, 59).unwrap().total_seconds(), 5999);
    }

    #[test]
    fn setters_reject_out_of_range_without_changing_state() {
        let mut model = Model::default();
        assert_eq!(model.set_tempo_bpm(9), Err(InputError::TempoOutOfRange(9)));
        assert_eq!(model.set_tempo_bpm(301), Err(InputError::TempoOutOfRange(301)));
        assert_eq!(model.tempo_bpm(), 120);
        assert!(model.set_freq_hz(19.0).is_err());
        assert!(model.set_accent_freq_hz(f32::NAN).is_err());
        assert_eq!(model.freq_hz(), 880.0);
        assert_eq!(model.set_timer_minutes(100), Err(InputError::MinutesOutOfRange(100)));
        assert_eq!(model.set_timer_seconds(60), Err(InputError::SecondsOutOfRange(60)));
        assert!(model.time_up());
    }

    #[test]
    fn saved_timer_is_restored() {
        let mut model = Model::default();
        model.set_timer_minutes(1).unwrap();
        model.set_timer_seconds(30).unwrap();
        model.save_timer();
        model.decrement_timer();
        assert_eq!(model.timer().to_string(), "01:29");
        model.restore_saved_timer();
        assert_eq!(model.timer().to_string(), "01:30");
    }

    #[test]
    fn volume_is_shared_with_the_handle() {
        let volume = Volume::new(0.25);
        let mut model = Model::new(volume.clone());
        model.set_volume(0.75);
        assert_eq!(volume.get(), 0.75);
        model.set_volume(3.0);
        assert_eq!(volume.get(), 1.0);
    }

    #[test]
    fn playback_config_is_a_snapshot() {
        let mut model = Model::default();
        model.set_tempo_bpm(90).unwrap();
        model.set_accent_interval(4);
        let config = model.playback_config();
        model.set_tempo_bpm(200).unwrap();
        assert_eq!(config.tempo_bpm, 90);
        assert_eq!(config.accent_interval, 4);
        assert_eq!(config.freq_hz, 880.0);
    }
}
