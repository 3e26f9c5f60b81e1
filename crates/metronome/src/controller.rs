//! User actions.
//!
//! Every front end goes through [`Controller`]: text handlers parse and validate
//! before touching the model, and the toggles decide between start and stop from
//! the current engine and timer state.

use std::sync::Arc;

use tone_player::{AlarmTrigger, EngineError, Transport};

use crate::model::{self, InputError, MAX_TEMPO_BPM, MIN_TEMPO_BPM, SharedModel};
use crate::timer::TimerController;

pub struct Controller {
    model: SharedModel,
    transport: Arc<dyn Transport>,
    alarm: Arc<dyn AlarmTrigger>,
    timer: TimerController,
}

impl Controller {
    pub fn new(
        model: SharedModel,
        transport: Arc<dyn Transport>,
        alarm: Arc<dyn AlarmTrigger>,
        timer: TimerController,
    ) -> Self {
        Self {
            model,
            transport,
            alarm,
            timer,
        }
    }

    pub fn model(&self) -> &SharedModel {
        &self.model
    }

    pub fn timer(&self) -> &TimerController {
        &self.timer
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }

    /// Start the metronome from the current settings, or stop it.
    ///
    /// Returns whether a session was started.
    pub fn toggle_metronome(&self) -> Result<bool, EngineError> {
        if self.transport.is_playing() {
            self.transport.stop();
            return Ok(false);
        }
        let config = model::lock(&self.model).playback_config();
        self.transport.start(config)?;
        Ok(true)
    }

    /// Start the countdown, or stop it. Returns whether the timer is now running.
    pub fn toggle_timer(&self) -> bool {
        if self.timer.is_running() {
            self.timer.stop();
            false
        } else {
            self.timer.start()
        }
    }

    pub fn alarm(&self) {
        self.alarm.alarm();
    }

    pub fn handle_tempo_text(&self, text: &str) -> Result<(), InputError> {
        let bpm = parse_int(text)?;
        let bpm = u32::try_from(bpm).map_err(|_| InputError::TempoOutOfRange(bpm))?;
        model::lock(&self.model).set_tempo_bpm(bpm)
    }

    pub fn handle_interval_text(&self, text: &str) -> Result<(), InputError> {
        let interval = parse_int(text)?;
        let interval = u32::try_from(interval).map_err(|_| InputError::NegativeInterval(interval))?;
        model::lock(&self.model).set_accent_interval(interval);
        Ok(())
    }

    pub fn handle_accent_freq_text(&self, text: &str) -> Result<(), InputError> {
        let hz = parse_float(text)?;
        model::lock(&self.model).set_accent_freq_hz(hz)
    }

    pub fn handle_freq_text(&self, text: &str) -> Result<(), InputError> {
        let hz = parse_float(text)?;
        model::lock(&self.model).set_freq_hz(hz)
    }

    pub fn handle_minutes_text(&self, text: &str) -> Result<(), InputError> {
        let minutes = parse_int(text)?;
        let minutes = u32::try_from(minutes).map_err(|_| InputError::MinutesOutOfRange(minutes))?;
        self.ensure_timer_idle()?;
        model::lock(&self.model).set_timer_minutes(minutes)
    }

    pub fn handle_seconds_text(&self, text: &str) -> Result<(), InputError> {
        let seconds = parse_int(text)?;
        let seconds = u32::try_from(seconds).map_err(|_| InputError::SecondsOutOfRange(seconds))?;
        self.ensure_timer_idle()?;
        model::lock(&self.model).set_timer_seconds(seconds)
    }

    /// Set the volume; out-of-range values are clamped.
    pub fn set_volume(&self, level: f32) -> f32 {
        let mut model = model::lock(&self.model);
        model.set_volume(level);
        model.volume()
    }

    pub fn nudge_volume(&self, delta: f32) -> f32 {
        let mut model = model::lock(&self.model);
        let level = model.volume() + delta;
        model.set_volume(level);
        model.volume()
    }

    /// Step the tempo, staying inside the accepted range. Applies on the next start.
    pub fn nudge_tempo(&self, delta: i32) -> u32 {
        let mut model = model::lock(&self.model);
        let bpm = i64::from(model.tempo_bpm()) + i64::from(delta);
        let bpm = bpm.clamp(i64::from(MIN_TEMPO_BPM), i64::from(MAX_TEMPO_BPM));
        // In range after the clamp.
        let _ = model.set_tempo_bpm(bpm as u32);
        model.tempo_bpm()
    }

    pub fn toggle_loop(&self) -> bool {
        let mut model = model::lock(&self.model);
        let looping = !model.is_looping();
        model.set_looping(looping);
        looping
    }

    fn ensure_timer_idle(&self) -> Result<(), InputError> {
        if self.timer.is_running() {
            Err(InputError::TimerRunning)
        } else {
            Ok(())
        }
    }
}

fn parse_int(text: &str) -> Result<i64, InputError> {
    text.trim()
        .parse::<i64>()
        .map_err(|_| InputError::NotANumber(text.to_string()))
}

fn parse_float(text: &str) -> Result<f32, InputError> {
    text.trim()
        .parse::<f32>()
        .map_err(|_| InputError::NotANumber(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Countdown, Model};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tone_player::PlaybackConfig;

    #[derive(Default)]
    struct FakeTransport {
        playing: AtomicBool,
        started: Mutex<Vec<PlaybackConfig>>,
        stops: AtomicUsize,
    }

    impl Transport for FakeTransport {
        fn start(&self, config: PlaybackConfig) -> Result<(), EngineError> {
            if self.playing.swap(true, Ordering::SeqCst) {
                return Err(EngineError::AlreadyPlaying);
            }
            self.started.lock().unwrap().push(config);
            Ok(())
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.playing.store(false, Ordering::SeqCst);
        }

        fn is_playing(&self) -> bool {
            self.playing.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct FakeAlarm {
        count: AtomicUsize,
    }

    impl AlarmTrigger for FakeAlarm {
        fn alarm(&self) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn controller() -> (Controller, Arc<FakeTransport>, Arc<FakeAlarm>) {
        let model = Model::default().shared();
        let transport = Arc::new(FakeTransport::default());
        let alarm = Arc::new(FakeAlarm::default());
        let timer = TimerController::new(model.clone(), alarm.clone(), Duration::from_secs(60));
        let controller = Controller::new(model, transport.clone(), alarm.clone(), timer);
        (controller, transport, alarm)
    }

    #[test]
    fn metronome_toggle_starts_with_a_snapshot_then_stops() {
        let (controller, transport, _) = controller();
        controller.handle_tempo_text("90").unwrap();
        controller.handle_interval_text("4").unwrap();

        assert!(controller.toggle_metronome().unwrap());
        controller.handle_tempo_text("200").unwrap();
        let started = transport.started.lock().unwrap().clone();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].tempo_bpm, 90);
        assert_eq!(started[0].accent_interval, 4);

        assert!(!controller.toggle_metronome().unwrap());
        assert_eq!(transport.stops.load(Ordering::SeqCst), 1);
        assert!(!controller.is_playing());
    }

    #[test]
    fn tempo_text_is_validated() {
        let (controller, _, _) = controller();
        assert_eq!(
            controller.handle_tempo_text("abc"),
            Err(InputError::NotANumber("abc".into()))
        );
        assert_eq!(controller.handle_tempo_text("9"), Err(InputError::TempoOutOfRange(9)));
        assert_eq!(controller.handle_tempo_text("-5"), Err(InputError::TempoOutOfRange(-5)));
        assert_eq!(controller.handle_tempo_text("301"), Err(InputError::TempoOutOfRange(301)));
        controller.handle_tempo_text(" 300 ").unwrap();
        assert_eq!(model::lock(controller.model()).tempo_bpm(), 300);
    }

    #[test]
    fn interval_accepts_zero_and_rejects_negative() {
        let (controller, _, _) = controller();
        controller.handle_interval_text("0").unwrap();
        assert_eq!(controller.handle_interval_text("-1"), Err(InputError::NegativeInterval(-1)));
        assert_eq!(model::lock(controller.model()).accent_interval(), 0);
    }

    #[test]
    fn timer_fields_are_validated() {
        let (controller, _, _) = controller();
        controller.handle_minutes_text("99").unwrap();
        controller.handle_seconds_text("59").unwrap();
        assert_eq!(controller.handle_minutes_text("100"), Err(InputError::MinutesOutOfRange(100)));
        assert_eq!(controller.handle_seconds_text("60"), Err(InputError::SecondsOutOfRange(60)));
        assert_eq!(controller.handle_seconds_text("-1"), Err(InputError::SecondsOutOfRange(-1)));
        assert_eq!(model::lock(controller.model()).timer().to_string(), "99:59");
    }

    #[test]
    fn timer_fields_are_locked_while_running() {
        let (controller, _, _) = controller();
        controller.handle_seconds_text("30").unwrap();
        assert!(controller.toggle_timer());
        assert_eq!(controller.handle_seconds_text("10"), Err(InputError::TimerRunning));
        assert!(!controller.toggle_timer());
        controller.handle_seconds_text("10").unwrap();
        assert_eq!(model::lock(controller.model()).timer(), Countdown::new(0, 10).unwrap());
    }

    #[test]
    fn timer_toggle_does_nothing_at_zero() {
        let (controller, _, alarm) = controller();
        assert!(!controller.toggle_timer());
        assert!(!controller.timer().is_running());
        assert_eq!(alarm.count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn frequencies_parse_as_floats() {
        let (controller, _, _) = controller();
        controller.handle_freq_text("440.5").unwrap();
        controller.handle_accent_freq_text("1000").unwrap();
        assert!(controller.handle_freq_text("5").is_err());
        let model = model::lock(controller.model());
        assert_eq!(model.freq_hz(), 440.5);
        assert_eq!(model.accent_freq_hz(), 1000.0);
    }

    #[test]
    fn nudges_stay_in_range() {
        let (controller, _, _) = controller();
        assert_eq!(controller.nudge_tempo(-500), MIN_TEMPO_BPM);
        assert_eq!(controller.nudge_tempo(5), 15);
        assert_eq!(controller.nudge_tempo(1000), MAX_TEMPO_BPM);
        assert_eq!(controller.nudge_volume(0.5), 1.0);
        assert_eq!(controller.set_volume(0.5), 0.5);
        assert_eq!(controller.nudge_volume(-2.0), 0.0);
    }

    #[test]
    fn alarm_and_loop_pass_through() {
        let (controller, transport, alarm) = controller();
        controller.alarm();
        assert_eq!(alarm.count.load(Ordering::SeqCst), 1);
        assert!(!transport.is_playing());
        assert!(controller.toggle_loop());
        assert!(model::lock(controller.model()).is_looping());
        assert!(!controller.toggle_loop());
    }
}
