//! Settings file loading.
//!
//! The TOML file only provides starting values; nothing is written back.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tone_player::cpal_line::DEFAULT_LINE_BUFFER_SAMPLES;

use crate::model::{Countdown, Model};

/// Top-level settings file.
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    pub metronome: Option<MetronomeSettings>,
    pub timer: Option<TimerSettings>,
    pub audio: Option<AudioSettings>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MetronomeSettings {
    /// Beats per minute (10-300).
    pub tempo_bpm: Option<u32>,
    /// Accent every N beats; 0 disables accents.
    pub accent_interval: Option<u32>,
    pub accent_freq_hz: Option<f32>,
    pub freq_hz: Option<f32>,
    /// 0.0-1.0; values outside are clamped.
    pub volume: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TimerSettings {
    pub minutes: Option<u32>,
    pub seconds: Option<u32>,
    /// Restart from the starting time after each alarm.
    #[serde(rename = "loop")]
    pub looping: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AudioSettings {
    /// Output device, matched by case-insensitive substring.
    pub device: Option<String>,
    /// Samples buffered ahead of the device on each line.
    pub buffer_samples: Option<usize>,
}

/// Resolved output settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioOptions {
    pub device: Option<String>,
    pub buffer_samples: usize,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read settings {:?}", path))?;
        Self::parse(&raw).with_context(|| format!("parse settings {:?}", path))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str::<Settings>(raw)?)
    }

    /// Copy every value present in the file into `model`, validating as the UI would.
    pub fn apply(&self, model: &mut Model) -> Result<()> {
        if let Some(m) = &self.metronome {
            if let Some(bpm) = m.tempo_bpm {
                model.set_tempo_bpm(bpm).context("metronome.tempo_bpm")?;
            }
            if let Some(interval) = m.accent_interval {
                model.set_accent_interval(interval);
            }
            if let Some(hz) = m.accent_freq_hz {
                model.set_accent_freq_hz(hz).context("metronome.accent_freq_hz")?;
            }
            if let Some(hz) = m.freq_hz {
                model.set_freq_hz(hz).context("metronome.freq_hz")?;
            }
            if let Some(volume) = m.volume {
                model.set_volume(volume);
            }
        }
        if let Some(t) = &self.timer {
            let current = model.timer();
            let countdown = Countdown::new(
                t.minutes.unwrap_or(current.minutes()),
                t.seconds.unwrap_or(current.seconds()),
            )
            .context("timer")?;
            model.set_timer(countdown);
            if let Some(looping) = t.looping {
                model.set_looping(looping);
            }
        }
        Ok(())
    }

    pub fn audio(&self) -> AudioOptions {
        let audio = self.audio.as_ref();
        AudioOptions {
            device: normalize_device_name(audio.and_then(|a| a.device.clone())),
            buffer_samples: audio
                .and_then(|a| a.buffer_samples)
                .unwrap_or(DEFAULT_LINE_BUFFER_SAMPLES),
        }
    }
}

pub fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
