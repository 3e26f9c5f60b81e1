//! Countdown timer.
//!
//! A background thread ticks once per period. Each tick takes a second off the
//! countdown in the shared model; the tick that reaches 00:00 fires the alarm and
//! then either restarts from the saved time (loop mode) or ends the run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tone_player::AlarmTrigger;

use crate::model::{self, Countdown, SharedModel};

pub const TICK: Duration = Duration::from_secs(1);

const EVENT_CAPACITY: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimerEvent {
    /// The countdown moved; `remaining` is the value after this tick.
    Tick { remaining: Countdown },
    /// The countdown reached zero and the alarm was requested.
    Alarm { looping: bool },
    /// The run ended, either at zero or because `stop()` was called.
    Stopped,
}

pub struct TimerController {
    model: SharedModel,
    alarm: Arc<dyn AlarmTrigger>,
    period: Duration,
    run: Mutex<Option<TimerRun>>,
    events_tx: Sender<TimerEvent>,
    events_rx: Receiver<TimerEvent>,
}

struct TimerRun {
    stop_tx: Sender<()>,
    running: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl TimerController {
    pub fn new(model: SharedModel, alarm: Arc<dyn AlarmTrigger>, period: Duration) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::bounded(EVENT_CAPACITY);
        Self {
            model,
            alarm,
            period,
            run: Mutex::new(None),
            events_tx,
            events_rx,
        }
    }

    /// Start counting down from the model's current time.
    ///
    /// Returns `false` without doing anything if the timer is already running
    /// or the countdown is at 00:00.
    pub fn start(&self) -> bool {
        let mut run = lock(&self.run);
        if run.as_ref().is_some_and(TimerRun::is_running) {
            return false;
        }
        let from = {
            let mut model = model::lock(&self.model);
            if model.time_up() {
                tracing::debug!("timer not started: countdown is at 00:00");
                return false;
            }
            model.save_timer();
            model.timer()
        };
        if let Some(previous) = run.take() {
            let _ = previous.join.join();
        }

        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let running = Arc::new(AtomicBool::new(true));
        let ticker = Ticker {
            model: self.model.clone(),
            alarm: self.alarm.clone(),
            events: self.events_tx.clone(),
        };
        let period = self.period;
        let flag = running.clone();
        let spawned = thread::Builder::new()
            .name("timer".into())
            .spawn(move || ticker.run(period, stop_rx, flag));
        match spawned {
            Ok(join) => {
                tracing::info!(from = %from, "timer started");
                *run = Some(TimerRun {
                    stop_tx,
                    running,
                    join,
                });
                true
            }
            Err(e) => {
                tracing::error!("spawn timer thread: {e}");
                false
            }
        }
    }

    /// Stop the countdown where it is. Safe to call when idle.
    pub fn stop(&self) {
        let Some(run) = lock(&self.run).take() else {
            return;
        };
        let _ = run.stop_tx.try_send(());
        let _ = run.join.join();
    }

    pub fn is_running(&self) -> bool {
        lock(&self.run).as_ref().is_some_and(TimerRun::is_running)
    }

    /// Receiver for timer events. Events are dropped when nobody drains them.
    pub fn events(&self) -> Receiver<TimerEvent> {
        self.events_rx.clone()
    }
}

impl Drop for TimerController {
    fn drop(&mut self) {
        self.stop();
    }
}

impl TimerRun {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

struct Ticker {
    model: SharedModel,
    alarm: Arc<dyn AlarmTrigger>,
    events: Sender<TimerEvent>,
}

impl Ticker {
    fn run(self, period: Duration, stop_rx: Receiver<()>, running: Arc<AtomicBool>) {
        let ticks = crossbeam_channel::tick(period);
        loop {
            crossbeam_channel::select! {
                recv(stop_rx) -> _ => {
                    tracing::info!("timer stopped");
                    break;
                }
                recv(ticks) -> _ => {
                    if !self.tick() {
                        tracing::info!("timer finished");
                        break;
                    }
                }
            }
        }
        running.store(false, Ordering::Release);
        self.emit(TimerEvent::Stopped);
    }

    /// One second elapsed. Returns whether the run continues.
    fn tick(&self) -> bool {
        let (remaining, looping) = {
            let mut model = model::lock(&self.model);
            model.decrement_timer();
            let remaining = model.timer();
            let looping = model.is_looping();
            if remaining.is_zero() && looping {
                model.restore_saved_timer();
            }
            (remaining, looping)
        };
        self.emit(TimerEvent::Tick { remaining });
        if !remaining.is_zero() {
            return true;
        }

        tracing::info!(looping, "countdown reached zero");
        self.alarm.alarm();
        self.emit(TimerEvent::Alarm { looping });
        looping
    }

    fn emit(&self, event: TimerEvent) {
        if let Err(TrySendError::Full(event)) = self.events.try_send(event) {
            tracing::trace!(?event, "timer event channel full; dropping");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
