//! Metronome playback engine.
//!
//! ## Threads
//! - **metronome worker**: one per session, spawned by `start()`, joined by the
//!   next `start()` or by `shutdown()`. It owns the metronome line for the whole
//!   session and writes beats back to back; the blocking write is the clock.
//! - **alarm worker**: one for the engine's lifetime, fed by a bounded queue. Each
//!   alarm opens a private line so it never touches the metronome stream.
//!
//! `start`, `stop` and `alarm` only hand work off and return. Stopping is
//! cooperative: the worker checks its cancel token once per beat, so stop latency
//! is at most one beat period.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::config::{EngineConfig, PlaybackConfig};
use crate::error::{EngineError, ToneError};
use crate::events::{EngineEvent, EventSender, SessionEnd};
use crate::line::{LineFactory, OutputLine, PcmFormat};
use crate::tone::{ToneBuffer, ToneGenerator};
use crate::volume::{Volume, apply_volume};

/// Metronome controls as seen by the front end.
pub trait Transport: Send + Sync {
    fn start(&self, config: PlaybackConfig) -> Result<(), EngineError>;
    fn stop(&self);
    fn is_playing(&self) -> bool;
}

/// The only engine entry point the countdown timer needs.
pub trait AlarmTrigger: Send + Sync {
    fn alarm(&self);
}

pub struct PlaybackEngine {
    format: PcmFormat,
    generator: ToneGenerator,
    volume: Volume,
    line: Arc<Mutex<Box<dyn OutputLine>>>,
    shared: Arc<EngineShared>,
    session: Mutex<Option<Session>>,
    alarm_tx: Mutex<Option<Sender<()>>>,
    alarm_worker: Mutex<Option<JoinHandle<()>>>,
    events: EventSender,
    events_rx: Receiver<EngineEvent>,
}

/// State read by callers and written by the metronome worker.
#[derive(Default)]
struct EngineShared {
    running: AtomicBool,
    beats: AtomicU64,
    last_end: Mutex<Option<SessionEnd>>,
}

struct Session {
    cancel: CancelToken,
    join: JoinHandle<()>,
}

/// Cooperative stop flag polled by a worker at beat boundaries.
#[derive(Clone, Default)]
struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl PlaybackEngine {
    /// Acquire the metronome line and start the alarm worker.
    ///
    /// Failing to acquire a line is reported as [`EngineError::NoOutput`]; callers
    /// should treat it as fatal.
    pub fn new(
        factory: Arc<dyn LineFactory>,
        volume: Volume,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let format = factory.format();
        let generator = ToneGenerator::new(format.sample_rate)?.with_beep_ms(config.beep_ms);
        let line = factory.create_line().map_err(EngineError::NoOutput)?;
        let (events, events_rx) = EventSender::channel(config.event_capacity);

        let alarm = AlarmWorker {
            tone: generator.generate_beat(config.alarm.tempo_bpm, config.alarm.freq_hz)?,
            repeats: config.alarm.repeats,
            factory,
            format,
            volume: volume.clone(),
            events: events.clone(),
        };
        let (alarm_tx, alarm_rx) = crossbeam_channel::bounded(config.alarm_backlog);
        let alarm_worker = thread::Builder::new()
            .name("alarm".into())
            .spawn(move || alarm.run(alarm_rx))?;

        Ok(Self {
            format,
            generator,
            volume,
            line: Arc::new(Mutex::new(line)),
            shared: Arc::new(EngineShared::default()),
            session: Mutex::new(None),
            alarm_tx: Mutex::new(Some(alarm_tx)),
            alarm_worker: Mutex::new(Some(alarm_worker)),
            events,
            events_rx,
        })
    }

    /// Begin a metronome session with `config` captured as-is.
    ///
    /// Returns [`EngineError::AlreadyPlaying`] without touching the running session
    /// if one is active (including one that was asked to stop but has not reached
    /// its next beat boundary yet).
    pub fn start(&self, config: PlaybackConfig) -> Result<(), EngineError> {
        // Held until the new session is stored, so a concurrent `stop()` that
        // observes `running` always finds the session's cancel token.
        let mut session = lock(&self.session);
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!("start() called while the metronome is already playing");
            return Err(EngineError::AlreadyPlaying);
        }
        self.spawn_session(&mut session, config).inspect_err(|_| {
            self.shared.running.store(false, Ordering::Release);
        })
    }

    fn spawn_session(
        &self,
        session: &mut Option<Session>,
        config: PlaybackConfig,
    ) -> Result<(), EngineError> {
        let tones = BeatTones::new(&self.generator, &config)?;

        if let Some(previous) = session.take() {
            // `running` was false, so the previous worker is past its last statement.
            let _ = previous.join.join();
        }
        self.shared.beats.store(0, Ordering::Relaxed);

        let cancel = CancelToken::default();
        let worker = MetronomeWorker {
            line: self.line.clone(),
            format: self.format,
            tones,
            volume: self.volume.clone(),
            cancel: cancel.clone(),
            shared: self.shared.clone(),
            events: self.events.clone(),
        };
        let join = thread::Builder::new()
            .name("metronome".into())
            .spawn(move || worker.run())?;
        *session = Some(Session { cancel, join });

        tracing::info!(
            tempo_bpm = config.tempo_bpm,
            accent_interval = config.accent_interval,
            accent_freq_hz = config.accent_freq_hz,
            freq_hz = config.freq_hz,
            "metronome started"
        );
        Ok(())
    }

    /// Ask the running session to stop at its next beat boundary. Safe when idle.
    pub fn stop(&self) {
        if let Some(session) = lock(&self.session).as_ref() {
            if !session.cancel.is_cancelled() {
                tracing::debug!("metronome stop requested");
            }
            session.cancel.cancel();
        }
    }

    /// Whether a session is running. May lag a concurrent `stop()` by up to one beat.
    pub fn is_playing(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Queue one alarm. Never affects the metronome session.
    ///
    /// When the alarm backlog is full the request is dropped and logged.
    pub fn alarm(&self) {
        let guard = lock(&self.alarm_tx);
        let Some(tx) = guard.as_ref() else {
            tracing::warn!("alarm requested after shutdown");
            return;
        };
        match tx.try_send(()) {
            Ok(()) => tracing::debug!("alarm queued"),
            Err(TrySendError::Full(())) => tracing::warn!("alarm already pending; request dropped"),
            Err(TrySendError::Disconnected(())) => tracing::warn!("alarm worker is gone"),
        }
    }

    /// Beats written in the current (or most recent) session.
    pub fn beat_count(&self) -> u64 {
        self.shared.beats.load(Ordering::Relaxed)
    }

    /// How the most recent session ended, if one has ended.
    pub fn last_end(&self) -> Option<SessionEnd> {
        *lock(&self.shared.last_end)
    }

    /// Receiver for engine events. Clones share one queue.
    pub fn events(&self) -> Receiver<EngineEvent> {
        self.events_rx.clone()
    }

    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    pub fn set_volume(&self, level: f32) {
        self.volume.set(level);
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Stop the session, join both workers and close the metronome line.
    ///
    /// Blocks for up to one beat period plus any alarm in progress.
    pub fn shutdown(&self) {
        self.stop();
        if let Some(session) = lock(&self.session).take() {
            let _ = session.join.join();
        }
        drop(lock(&self.alarm_tx).take());
        if let Some(join) = lock(&self.alarm_worker).take() {
            let _ = join.join();
        }
        lock(&self.line).close();
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Transport for PlaybackEngine {
    fn start(&self, config: PlaybackConfig) -> Result<(), EngineError> {
        PlaybackEngine::start(self, config)
    }

    fn stop(&self) {
        PlaybackEngine::stop(self)
    }

    fn is_playing(&self) -> bool {
        PlaybackEngine::is_playing(self)
    }
}

impl AlarmTrigger for PlaybackEngine {
    fn alarm(&self) {
        PlaybackEngine::alarm(self)
    }
}

/// Pre-rendered tones for one session.
struct BeatTones {
    normal: ToneBuffer,
    accent: Option<ToneBuffer>,
    interval: u32,
}

impl BeatTones {
    fn new(generator: &ToneGenerator, config: &PlaybackConfig) -> Result<Self, ToneError> {
        let normal = generator.generate_beat(config.tempo_bpm, config.freq_hz)?;
        let accent = match config.accent_interval {
            0 => None,
            _ => Some(generator.generate_beat(config.tempo_bpm, config.accent_freq_hz)?),
        };
        Ok(Self {
            normal,
            accent,
            interval: config.accent_interval,
        })
    }

    fn is_accent(&self, beat: u64) -> bool {
        self.interval != 0 && beat % u64::from(self.interval) == 0
    }

    /// Tone for 1-based beat `beat`, and whether it is the accented one.
    fn select(&self, beat: u64) -> (&ToneBuffer, bool) {
        match &self.accent {
            Some(accent) if self.is_accent(beat) => (accent, true),
            _ => (&self.normal, false),
        }
    }
}

struct MetronomeWorker {
    line: Arc<Mutex<Box<dyn OutputLine>>>,
    format: PcmFormat,
    tones: BeatTones,
    volume: Volume,
    cancel: CancelToken,
    shared: Arc<EngineShared>,
    events: EventSender,
}

impl MetronomeWorker {
    fn run(self) {
        self.events.emit(EngineEvent::Started);

        let mut line = lock(&self.line);
        let result = self.play(line.as_mut());
        line.stop();
        line.flush();
        let beats = self.shared.beats.load(Ordering::Relaxed);
        let event = match result {
            Ok(()) => {
                tracing::info!(beats, "metronome stopped");
                *lock(&self.shared.last_end) = Some(SessionEnd::Stopped);
                EngineEvent::Stopped
            }
            Err(e) => {
                tracing::warn!(beats, "playback interrupted: {e:#}");
                // A failed line is reopened by the next session.
                line.close();
                *lock(&self.shared.last_end) = Some(SessionEnd::Error);
                EngineEvent::Interrupted {
                    error: format!("{e:#}"),
                }
            }
        };
        drop(line);

        self.shared.running.store(false, Ordering::Release);
        self.events.emit(event);
    }

    fn play(&self, line: &mut dyn OutputLine) -> Result<()> {
        if !line.is_open() {
            line.open(self.format).context("open metronome line")?;
        }
        line.start().context("start metronome line")?;

        while !self.cancel.is_cancelled() {
            let index = self.shared.beats.fetch_add(1, Ordering::Relaxed) + 1;
            let (tone, accented) = self.tones.select(index);
            let buffer = apply_volume(tone, self.volume.get());
            self.events.emit(EngineEvent::Beat { index, accented });
            line.write(buffer.samples())
                .with_context(|| format!("write beat {index}"))?;
        }
        Ok(())
    }
}

struct AlarmWorker {
    tone: ToneBuffer,
    repeats: usize,
    factory: Arc<dyn LineFactory>,
    format: PcmFormat,
    volume: Volume,
    events: EventSender,
}

impl AlarmWorker {
    fn run(self, requests: Receiver<()>) {
        while requests.recv().is_ok() {
            self.events.emit(EngineEvent::AlarmStarted);
            match self.play_once() {
                Ok(()) => self.events.emit(EngineEvent::AlarmFinished),
                Err(e) => {
                    tracing::warn!("alarm failed: {e:#}");
                    self.events.emit(EngineEvent::AlarmFailed {
                        error: format!("{e:#}"),
                    });
                }
            }
        }
    }

    fn play_once(&self) -> Result<()> {
        let buffer = apply_volume(&self.tone, self.volume.get());
        let mut line = self.factory.create_line().context("acquire alarm line")?;
        let result = write_alarm(line.as_mut(), self.format, &buffer, self.repeats);
        line.stop();
        line.close();
        result
    }
}

fn write_alarm(
    line: &mut dyn OutputLine,
    format: PcmFormat,
    buffer: &ToneBuffer,
    repeats: usize,
) -> Result<()> {
    line.open(format).context("open alarm line")?;
    line.start().context("start alarm line")?;
    for _ in 0..repeats {
        line.write(buffer.samples()).context("write alarm beep")?;
    }
    line.drain().context("drain alarm line")
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
