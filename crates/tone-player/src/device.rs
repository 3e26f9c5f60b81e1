//! Output device selection.
//!
//! Devices are matched by case-insensitive name fragment, so `--device usb`
//! finds "USB Audio DAC". The stream config is the one closest to the rate the
//! tones are synthesised at.

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use cpal::traits::{DeviceTrait, HostTrait};

/// Largest fixed callback buffer we ask for; keeps beat onsets tight.
const MAX_BUFFER_FRAMES: u32 = 1024;
/// Frames assumed in flight when the host picks the buffer size itself.
const DEFAULT_BUFFER_FRAMES: u32 = 4096;

/// Find an output device by name fragment, or fall back to the host default.
pub fn pick_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device> {
    let Some(name) = name else {
        return host
            .default_output_device()
            .ok_or_else(|| anyhow!("no default output device"));
    };
    let devices = host.output_devices().context("enumerate output devices")?;
    for device in devices {
        let Ok(description) = device.description() else {
            continue;
        };
        if matches_device_name(&description.name().to_string(), name) {
            return Ok(device);
        }
    }
    bail!("no output device matches {name:?} (see --list-devices)")
}

/// Choose the output config closest to `target_rate`.
///
/// Exact rate matches win; otherwise the highest rate at or below the target,
/// then the lowest rate above it. Ties prefer formats needing less conversion
/// from `i16`, then fewer channels.
pub fn pick_output_config(
    device: &cpal::Device,
    target_rate: u32,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> =
        device.supported_output_configs()?.collect();

    let mut best: Option<(Candidate, cpal::SupportedStreamConfig)> = None;
    for range in ranges {
        let rate = pick_rate_for_range(range.min_sample_rate(), range.max_sample_rate(), target_rate);
        let candidate = Candidate {
            below: rate <= target_rate,
            rate,
            format_rank: sample_format_rank(range.sample_format()),
            channels: range.channels(),
        };
        let replace = match &best {
            None => true,
            Some((current, _)) => candidate.is_better_than(current, target_rate),
        };
        if replace {
            best = Some((candidate, range.with_sample_rate(rate)));
        }
    }

    best.map(|(_, cfg)| cfg)
        .ok_or_else(|| anyhow!("device offers no output configs"))
}

/// Prefer a small fixed buffer if the device advertises a range.
///
/// Returns `None` when the device only supports its default buffer size.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            Some(cpal::BufferSize::Fixed(MAX_BUFFER_FRAMES.clamp(*min, (*max).max(*min))))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Time the device needs to play one full callback buffer.
pub fn buffer_duration(config: &cpal::StreamConfig) -> Duration {
    let frames = match config.buffer_size {
        cpal::BufferSize::Fixed(frames) => frames,
        cpal::BufferSize::Default => DEFAULT_BUFFER_FRAMES,
    };
    Duration::from_secs_f64(f64::from(frames) / f64::from(config.sample_rate.max(1)))
}

/// Print output devices to stdout, marking the host default with `*`.
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    let default_name = host
        .default_output_device()
        .and_then(|d| d.description().ok())
        .map(|d| d.name().to_string());
    let devices = host.output_devices().context("enumerate output devices")?;
    for (i, device) in devices.enumerate() {
        let description = device.description()?;
        let name = description.name().to_string();
        let marker = if default_name.as_deref() == Some(name.as_str()) { "*" } else { " " };
        println!("{marker} #{i}: {description}");
    }
    Ok(())
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    below: bool,
    rate: u32,
    format_rank: u8,
    channels: u16,
}

impl Candidate {
    fn is_better_than(&self, other: &Candidate, target_rate: u32) -> bool {
        let exact = self.rate == target_rate;
        let other_exact = other.rate == target_rate;
        if exact != other_exact {
            return exact;
        }
        if self.below != other.below {
            return self.below;
        }
        if self.rate != other.rate {
            // Below the target: closer means higher. Above it: closer means lower.
            return if self.below {
                self.rate > other.rate
            } else {
                self.rate < other.rate
            };
        }
        if self.format_rank != other.format_rank {
            return self.format_rank < other.format_rank;
        }
        self.channels < other.channels
    }
}

fn pick_rate_for_range(min: u32, max: u32, target: u32) -> u32 {
    target.clamp(min, max.max(min))
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::I16 => 0,
        cpal::SampleFormat::F32 => 1,
        cpal::SampleFormat::I32 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(rate: u32, format_rank: u8, channels: u16) -> Candidate {
        Candidate {
            below: rate <= 44_100,
            rate,
            format_rank,
            channels,
        }
    }

    #[test]
    fn matches_device_name_is_case_insensitive() {
        assert!(matches_device_name("USB DAC", "dac"));
        assert!(matches_device_name("usb dac", "USB"));
        assert!(!matches_device_name("USB DAC", "speaker"));
        assert!(!matches_device_name("USB DAC", "  "));
    }

    #[test]
    fn pick_rate_for_range_prefers_target_when_in_range() {
        assert_eq!(pick_rate_for_range(8_000, 96_000, 44_100), 44_100);
    }

    #[test]
    fn pick_rate_for_range_clamps_to_range() {
        assert_eq!(pick_rate_for_range(48_000, 96_000, 44_100), 48_000);
        assert_eq!(pick_rate_for_range(8_000, 22_050, 44_100), 22_050);
    }

    #[test]
    fn exact_rate_beats_everything_else() {
        let exact = candidate(44_100, 3, 8);
        let other = candidate(48_000, 0, 1);
        assert!(exact.is_better_than(&other, 44_100));
        assert!(!other.is_better_than(&exact, 44_100));
    }

    #[test]
    fn below_target_prefers_closest_rate() {
        let near = candidate(32_000, 0, 2);
        let far = candidate(22_050, 0, 2);
        assert!(near.is_better_than(&far, 44_100));
    }

    #[test]
    fn above_target_prefers_lowest_rate() {
        let near = candidate(48_000, 0, 2);
        let far = candidate(96_000, 0, 2);
        assert!(near.is_better_than(&far, 44_100));
    }

    #[test]
    fn ties_prefer_i16_then_fewer_channels() {
        assert!(candidate(44_100, 0, 2).is_better_than(&candidate(44_100, 1, 2), 44_100));
        assert!(candidate(44_100, 0, 1).is_better_than(&candidate(44_100, 0, 2), 44_100));
    }

    #[test]
    fn buffer_duration_follows_frames_and_rate() {
        let fixed = cpal::StreamConfig {
            channels: 2,
            sample_rate: 48_000,
            buffer_size: cpal::BufferSize::Fixed(480),
        };
        assert_eq!(buffer_duration(&fixed), Duration::from_millis(10));

        let host_default = cpal::StreamConfig {
            buffer_size: cpal::BufferSize::Default,
            sample_rate: 44_100,
            ..fixed
        };
        let expected = Duration::from_secs_f64(4096.0 / 44_100.0);
        assert_eq!(buffer_duration(&host_default), expected);
    }
}
