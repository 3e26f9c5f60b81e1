use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use crossterm::{
    event::{self, Event as CEvent, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tone_player::EngineEvent;

use crate::controller::Controller;
use crate::timer::TimerEvent;

use super::render;

const LOG_CAP: usize = 500;
const TEMPO_STEP: i32 = 1;
const VOLUME_STEP: f32 = 0.05;

/// Launch the TUI and drive the event loop until the user quits.
pub(crate) fn run_tui(
    controller: Controller,
    engine_rx: Receiver<EngineEvent>,
    log_rx: Receiver<String>,
) -> Result<()> {
    let timer_rx = controller.timer().events();
    let mut app = App::new(controller, engine_rx, timer_rx, log_rx);

    let mut term = init_terminal()?;
    let result = ui_loop(&mut term, &mut app);
    restore_terminal(&mut term)?;

    app.controller.timer().stop();
    result
}

/// Editable settings, in Tab order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Field {
    Tempo,
    Interval,
    AccentFreq,
    Freq,
    Minutes,
    Seconds,
}

impl Field {
    pub(crate) const ALL: [Field; 6] = [
        Field::Tempo,
        Field::Interval,
        Field::AccentFreq,
        Field::Freq,
        Field::Minutes,
        Field::Seconds,
    ];

    fn next(self) -> Self {
        let i = Self::ALL.iter().position(|f| *f == self).unwrap_or(0);
        Self::ALL[(i + 1) % Self::ALL.len()]
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            Field::Tempo => "tempo",
            Field::Interval => "accent every",
            Field::AccentFreq => "accent Hz",
            Field::Freq => "beep Hz",
            Field::Minutes => "minutes",
            Field::Seconds => "seconds",
        }
    }
}

/// In-memory UI state for rendering + interaction.
pub(crate) struct App {
    pub(crate) controller: Controller,
    pub(crate) field: Field,
    pub(crate) input: String,
    pub(crate) status: String,
    pub(crate) last_beat: Option<(u64, bool)>,
    pub(crate) alarm_playing: bool,
    pub(crate) logs_open: bool,
    pub(crate) logs: VecDeque<String>,
    engine_rx: Receiver<EngineEvent>,
    timer_rx: Receiver<TimerEvent>,
    log_rx: Receiver<String>,
}

impl App {
    fn new(
        controller: Controller,
        engine_rx: Receiver<EngineEvent>,
        timer_rx: Receiver<TimerEvent>,
        log_rx: Receiver<String>,
    ) -> Self {
        Self {
            controller,
            field: Field::Tempo,
            input: String::new(),
            status: "Ready".into(),
            last_beat: None,
            alarm_playing: false,
            logs_open: false,
            logs: VecDeque::new(),
            engine_rx,
            timer_rx,
            log_rx,
        }
    }

    /// Apply one key press. Returns `true` when the user asked to quit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') => return true,
            KeyCode::Char(' ') => self.toggle_metronome(),
            KeyCode::Char('t') => {
                let was_running = self.controller.timer().is_running();
                let running = self.controller.toggle_timer();
                self.status = match (was_running, running) {
                    (true, _) => "Timer stopped".into(),
                    (false, true) => "Timer running".into(),
                    (false, false) => "Set a time first".into(),
                };
            }
            KeyCode::Char('a') => {
                self.controller.alarm();
                self.status = "Alarm".into();
            }
            KeyCode::Char('+') | KeyCode::Char('=') => {
                let bpm = self.controller.nudge_tempo(TEMPO_STEP);
                self.status = format!("Tempo {bpm} BPM (applies on next start)");
            }
            KeyCode::Char('-') => {
                let bpm = self.controller.nudge_tempo(-TEMPO_STEP);
                self.status = format!("Tempo {bpm} BPM (applies on next start)");
            }
            KeyCode::Char(']') => {
                let level = self.controller.nudge_volume(VOLUME_STEP);
                self.status = format!("Volume {:.0}%", level * 100.0);
            }
            KeyCode::Char('[') => {
                let level = self.controller.nudge_volume(-VOLUME_STEP);
                self.status = format!("Volume {:.0}%", level * 100.0);
            }
            KeyCode::Char('l') => {
                let looping = self.controller.toggle_loop();
                self.status = format!("Loop {}", if looping { "on" } else { "off" });
            }
            KeyCode::Char('L') => self.logs_open = !self.logs_open,
            KeyCode::Char(c) if c.is_ascii_digit() || c == '.' => self.input.push(c),
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Esc => self.input.clear(),
            KeyCode::Tab => {
                self.field = self.field.next();
                self.input.clear();
            }
            KeyCode::Enter => self.commit_input(),
            _ => {}
        }
        false
    }

    fn toggle_metronome(&mut self) {
        match self.controller.toggle_metronome() {
            Ok(true) => self.status = "Metronome started".into(),
            Ok(false) => self.status = "Stopping".into(),
            Err(e) => self.status = format!("Error: {e}"),
        }
    }

    fn commit_input(&mut self) {
        if self.input.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.input);
        let c = &self.controller;
        let result = match self.field {
            Field::Tempo => c.handle_tempo_text(&text),
            Field::Interval => c.handle_interval_text(&text),
            Field::AccentFreq => c.handle_accent_freq_text(&text),
            Field::Freq => c.handle_freq_text(&text),
            Field::Minutes => c.handle_minutes_text(&text),
            Field::Seconds => c.handle_seconds_text(&text),
        };
        self.status = match result {
            Ok(()) => format!("{} set to {text}", self.field.label()),
            Err(e) => format!("Rejected: {e}"),
        };
    }

    fn drain_events(&mut self) {
        while let Ok(ev) = self.engine_rx.try_recv() {
            match ev {
                EngineEvent::Started => self.last_beat = None,
                EngineEvent::Beat { index, accented } => self.last_beat = Some((index, accented)),
                EngineEvent::Stopped => self.status = "Metronome stopped".into(),
                EngineEvent::Interrupted { error } => {
                    self.status = format!("Playback interrupted: {error}");
                }
                EngineEvent::AlarmStarted => self.alarm_playing = true,
                EngineEvent::AlarmFinished => self.alarm_playing = false,
                EngineEvent::AlarmFailed { error } => {
                    self.alarm_playing = false;
                    self.status = format!("Alarm failed: {error}");
                }
            }
        }
        while let Ok(ev) = self.timer_rx.try_recv() {
            match ev {
                TimerEvent::Tick { .. } => {}
                TimerEvent::Alarm { looping: true } => self.status = "Time's up! Restarting".into(),
                TimerEvent::Alarm { looping: false } => self.status = "Time's up!".into(),
                TimerEvent::Stopped => {}
            }
        }
        while let Ok(line) = self.log_rx.try_recv() {
            self.push_log_line(line);
        }
    }

    fn push_log_line(&mut self, line: String) {
        if self.logs.len() >= LOG_CAP {
            self.logs.pop_front();
        }
        self.logs.push_back(line);
    }
}

fn ui_loop(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    let tick = Duration::from_millis(33);

    loop {
        app.drain_events();
        terminal.draw(|f| render::draw(f, app))?;

        if event::poll(tick).context("poll terminal events")? {
            if let CEvent::Key(k) = event::read().context("read terminal event")? {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                if app.handle_key(k.code) {
                    return Ok(());
                }
            }
        }
    }
}

fn init_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend).context("create terminal")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{self, Model};
    use crate::timer::TimerController;
    use crossbeam_channel::{Sender, unbounded};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tone_player::{AlarmTrigger, EngineError, PlaybackConfig, Transport};

    #[derive(Default)]
    struct FakeEngine {
        playing: AtomicBool,
    }

    impl Transport for FakeEngine {
        fn start(&self, _config: PlaybackConfig) -> Result<(), EngineError> {
            self.playing.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&self) {
            self.playing.store(false, Ordering::SeqCst);
        }

        fn is_playing(&self) -> bool {
            self.playing.load(Ordering::SeqCst)
        }
    }

    impl AlarmTrigger for FakeEngine {
        fn alarm(&self) {}
    }

    struct Harness {
        app: App,
        engine: Arc<FakeEngine>,
        engine_tx: Sender<EngineEvent>,
        log_tx: Sender<String>,
    }

    fn harness() -> Harness {
        let model = Model::default().shared();
        let engine = Arc::new(FakeEngine::default());
        let timer = TimerController::new(model.clone(), engine.clone(), Duration::from_secs(60));
        let timer_rx = timer.events();
        let controller = Controller::new(model, engine.clone(), engine.clone(), timer);
        let (engine_tx, engine_rx) = unbounded();
        let (log_tx, log_rx) = unbounded();
        Harness {
            app: App::new(controller, engine_rx, timer_rx, log_rx),
            engine,
            engine_tx,
            log_tx,
        }
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            app.handle_key(KeyCode::Char(c));
        }
    }

    #[test]
    fn typed_tempo_is_committed_on_enter() {
        let mut h = harness();
        type_text(&mut h.app, "96");
        assert_eq!(h.app.input, "96");
        h.app.handle_key(KeyCode::Enter);
        assert!(h.app.input.is_empty());
        assert_eq!(model::lock(h.app.controller.model()).tempo_bpm(), 96);
    }

    #[test]
    fn rejected_input_reports_and_keeps_the_model() {
        let mut h = harness();
        type_text(&mut h.app, "5");
        h.app.handle_key(KeyCode::Enter);
        assert!(h.app.status.starts_with("Rejected"));
        assert_eq!(model::lock(h.app.controller.model()).tempo_bpm(), 120);
    }

    #[test]
    fn tab_moves_to_the_next_field_and_discards_input() {
        let mut h = harness();
        type_text(&mut h.app, "12");
        h.app.handle_key(KeyCode::Tab);
        assert_eq!(h.app.field, Field::Interval);
        assert!(h.app.input.is_empty());
        for _ in 0..Field::ALL.len() - 1 {
            h.app.handle_key(KeyCode::Tab);
        }
        assert_eq!(h.app.field, Field::Tempo);
    }

    #[test]
    fn seconds_field_sets_the_timer() {
        let mut h = harness();
        while h.app.field != Field::Seconds {
            h.app.handle_key(KeyCode::Tab);
        }
        type_text(&mut h.app, "45");
        h.app.handle_key(KeyCode::Enter);
        assert_eq!(model::lock(h.app.controller.model()).timer().to_string(), "00:45");
    }

    #[test]
    fn space_toggles_the_metronome_and_q_quits() {
        let mut h = harness();
        assert!(!h.app.handle_key(KeyCode::Char(' ')));
        assert!(h.engine.is_playing());
        h.app.handle_key(KeyCode::Char(' '));
        assert!(!h.engine.is_playing());
        assert!(h.app.handle_key(KeyCode::Char('q')));
    }

    #[test]
    fn engine_events_update_the_view() {
        let mut h = harness();
        h.engine_tx.send(EngineEvent::Beat { index: 4, accented: true }).unwrap();
        h.engine_tx.send(EngineEvent::AlarmStarted).unwrap();
        h.app.drain_events();
        assert_eq!(h.app.last_beat, Some((4, true)));
        assert!(h.app.alarm_playing);

        h.engine_tx
            .send(EngineEvent::Interrupted { error: "device lost".into() })
            .unwrap();
        h.engine_tx.send(EngineEvent::AlarmFinished).unwrap();
        h.app.drain_events();
        assert!(h.app.status.contains("device lost"));
        assert!(!h.app.alarm_playing);
    }

    #[test]
    fn log_panel_keeps_the_newest_lines() {
        let mut h = harness();
        for n in 0..LOG_CAP + 10 {
            h.log_tx.send(format!("line {n}")).unwrap();
        }
        h.app.drain_events();
        assert_eq!(h.app.logs.len(), LOG_CAP);
        assert_eq!(h.app.logs.front().map(String::as_str), Some("line 10"));
        h.app.handle_key(KeyCode::Char('L'));
        assert!(h.app.logs_open);
    }

    #[test]
    fn volume_keys_step_and_clamp() {
        let mut h = harness();
        h.app.handle_key(KeyCode::Char(']'));
        assert_eq!(model::lock(h.app.controller.model()).volume(), 1.0);
        for _ in 0..30 {
            h.app.handle_key(KeyCode::Char('['));
        }
        assert_eq!(model::lock(h.app.controller.model()).volume(), 0.0);
    }
}
