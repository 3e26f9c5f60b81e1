//! Runtime wiring.
//!
//! Resolves settings (file, then command line), builds the playback engine on
//! the selected output device, and runs one of the front ends.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use crossbeam_channel::Receiver;
use tone_player::cpal_line::CpalLineFactory;
use tone_player::config::SAMPLE_RATE_HZ;
use tone_player::{EngineConfig, EngineEvent, PlaybackEngine};

use crate::cli::{Args, Command};
use crate::controller::Controller;
use crate::model::{self, Countdown, Model};
use crate::settings::{self, AudioOptions, Settings};
use crate::timer::{self, TimerController, TimerEvent};
use crate::ui;

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    tone_player::device::list_devices(&host)
}

/// Starting model and audio options: defaults, then the settings file, then flags.
pub fn resolve(args: &Args) -> Result<(Model, AudioOptions)> {
    let settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let mut model = Model::default();
    settings.apply(&mut model)?;
    let mut audio = settings.audio();

    if let Some(bpm) = args.bpm {
        model.set_tempo_bpm(bpm).context("--bpm")?;
    }
    if let Some(interval) = args.accent_interval {
        model.set_accent_interval(interval);
    }
    if let Some(hz) = args.accent_freq {
        model.set_accent_freq_hz(hz).context("--accent-freq")?;
    }
    if let Some(hz) = args.freq {
        model.set_freq_hz(hz).context("--freq")?;
    }
    if let Some(volume) = args.volume {
        model.set_volume(volume);
    }
    if let Command::Timer {
        minutes,
        seconds,
        looping,
    } = args.command()
    {
        let current = model.timer();
        let countdown = Countdown::new(
            minutes.unwrap_or(current.minutes()),
            seconds.unwrap_or(current.seconds()),
        )
        .context("timer")?;
        model.set_timer(countdown);
        if looping {
            model.set_looping(true);
        }
    }
    if let Some(device) = settings::normalize_device_name(args.device.clone()) {
        audio.device = Some(device);
    }
    if let Some(samples) = args.buffer_samples {
        audio.buffer_samples = samples;
    }
    Ok((model, audio))
}

/// Everything a front end needs.
pub struct App {
    pub engine: Arc<PlaybackEngine>,
    pub controller: Controller,
}

/// Open the output device and build the engine, timer and controller around `model`.
pub fn build(model: Model, audio: &AudioOptions) -> Result<App> {
    let factory = CpalLineFactory::new(audio.device.as_deref(), SAMPLE_RATE_HZ, audio.buffer_samples)
        .context("open audio output")?;
    let engine = PlaybackEngine::new(
        Arc::new(factory),
        model.volume_handle().clone(),
        EngineConfig::default(),
    )?;
    let engine = Arc::new(engine);
    let model = model.shared();
    let timer = TimerController::new(model.clone(), engine.clone(), timer::TICK);
    let controller = Controller::new(model, engine.clone(), engine.clone(), timer);
    Ok(App { engine, controller })
}

pub fn run_tui(app: App, log_rx: Receiver<String>) -> Result<()> {
    let App { engine, controller } = app;
    let result = ui::run_tui(controller, engine.events(), log_rx);
    engine.shutdown();
    result
}

/// Play until Ctrl-C, or until `beats` beats have been written.
pub fn run_metronome(app: App, beats: Option<u64>) -> Result<()> {
    let App { engine, controller } = app;
    let interrupt = ctrlc_channel()?;
    let events = engine.events();

    let config = model::lock(controller.model()).playback_config();
    engine.start(config)?;
    tracing::info!("playing; press Ctrl-C to stop");

    let outcome = loop {
        crossbeam_channel::select! {
            recv(interrupt) -> _ => break Ok(()),
            recv(events) -> ev => match ev {
                Ok(EngineEvent::Beat { index, accented }) => {
                    tracing::debug!(index, accented, "beat");
                    if beats.is_some_and(|limit| index >= limit) {
                        break Ok(());
                    }
                }
                Ok(EngineEvent::Interrupted { error }) => {
                    break Err(anyhow!("playback interrupted: {error}"));
                }
                Ok(_) => {}
                Err(_) => break Ok(()),
            },
        }
    };

    engine.shutdown();
    outcome
}

/// Count down from the model's timer, sounding the alarm at zero.
///
/// Without loop mode this returns once the alarm has played; with it, on Ctrl-C.
pub fn run_timer(app: App) -> Result<()> {
    let App { engine, controller } = app;
    let interrupt = ctrlc_channel()?;
    let events = controller.timer().events();

    let from = model::lock(controller.model()).timer();
    if !controller.toggle_timer() {
        bail!("timer is at {from}; set --minutes/--seconds to count down");
    }

    loop {
        crossbeam_channel::select! {
            recv(interrupt) -> _ => {
                controller.timer().stop();
                break;
            }
            recv(events) -> ev => match ev {
                Ok(TimerEvent::Tick { remaining }) => tracing::info!(%remaining, "timer"),
                Ok(TimerEvent::Alarm { looping }) => tracing::info!(looping, "alarm"),
                Ok(TimerEvent::Stopped) | Err(_) => break,
            },
        }
    }

    // Joins the alarm worker, so a pending alarm is heard before exit.
    engine.shutdown();
    Ok(())
}

/// Play one alarm and wait for it to finish.
pub fn run_alarm(app: App) -> Result<()> {
    let App { engine, controller } = app;
    let events = engine.events();
    controller.alarm();

    let outcome = loop {
        match events.recv_timeout(Duration::from_secs(10)) {
            Ok(EngineEvent::AlarmFinished) => break Ok(()),
            Ok(EngineEvent::AlarmFailed { error }) => break Err(anyhow!("alarm failed: {error}")),
            Ok(_) => {}
            Err(_) => break Err(anyhow!("alarm did not finish")),
        }
    };
    engine.shutdown();
    outcome
}

fn ctrlc_channel() -> Result<Receiver<()>> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    })
    .context("install Ctrl-C handler")?;
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("metronome").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_without_file_or_flags() {
        let (model, audio) = resolve(&args(&[])).unwrap();
        assert_eq!(model.tempo_bpm(), 120);
        assert_eq!(audio.device, None);
    }

    #[test]
    fn flags_are_validated() {
        assert!(resolve(&args(&["--bpm", "5"])).is_err());
        assert!(resolve(&args(&["--freq", "1"])).is_err());
        assert!(resolve(&args(&["timer", "--seconds", "99"])).is_err());
    }

    #[test]
    fn flags_override_the_settings_file() {
        let path = std::env::temp_dir().join(format!("metronome-settings-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "[metronome]\ntempo_bpm = 80\naccent_interval = 2\n[timer]\nminutes = 3\n[audio]\ndevice = \"usb\"\n",
        )
        .unwrap();
        let path_arg = path.to_string_lossy().to_string();
        let (model, audio) = resolve(&args(&[
            "--config", &path_arg, "--bpm", "100", "--device", "dac", "timer", "--seconds", "15",
        ]))
        .unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(model.tempo_bpm(), 100);
        assert_eq!(model.accent_interval(), 2);
        assert_eq!(model.timer().to_string(), "03:15");
        assert_eq!(audio.device.as_deref(), Some("dac"));
    }

    #[test]
    fn missing_settings_file_is_an_error() {
        assert!(resolve(&args(&["--config", "/nonexistent/metronome.toml"])).is_err());
    }
}
