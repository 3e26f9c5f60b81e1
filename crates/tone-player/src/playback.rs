//! Playback stage (CPAL output stream).
//!
//! Builds the CPAL output stream and provides the real-time audio callback.
//! The callback:
//! - refills a small local buffer from the [`SampleQueue`] without blocking
//! - copies the mono signal to every device channel
//! - converts `i16` samples to the device sample format

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;

use crate::queue::SampleQueue;

/// Shared flags and counters wired into the output callback.
#[derive(Clone, Debug, Default)]
pub struct StreamFlags {
    /// Set by the error callback; the queue is closed at the same time.
    pub failed: Arc<AtomicBool>,
    /// Frames emitted as silence because the queue ran dry.
    pub underrun_frames: Arc<AtomicU64>,
}

/// Build a CPAL output stream that plays mono samples from `queue`.
///
/// Underruns are filled with silence; that is the normal state between sessions.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    queue: &Arc<SampleQueue>,
    flags: StreamFlags,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, queue, flags),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, queue, flags),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, queue, flags),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, queue, flags),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: &Arc<SampleQueue>,
    flags: StreamFlags,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<i16>,
{
    let channels_out = usize::from(config.channels.max(1));
    let queue_cb = queue.clone();
    let queue_err = queue.clone();
    let underrun_frames = flags.underrun_frames.clone();
    let failed = flags.failed.clone();

    let mut scratch: Vec<i16> = Vec::new();

    let err_fn = move |err: cpal::StreamError| {
        tracing::warn!("stream error: {err}");
        failed.store(true, Ordering::Relaxed);
        queue_err.close();
    };

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let frames = data.len() / channels_out;
            scratch.clear();
            let got = queue_cb.pop_into(&mut scratch, frames);

            for (frame, out) in data.chunks_mut(channels_out).enumerate() {
                let sample = scratch.get(frame).copied().unwrap_or(0);
                out.fill(<T as cpal::Sample>::from_sample::<i16>(sample));
            }

            if got < frames {
                underrun_frames.fetch_add((frames - got) as u64, Ordering::Relaxed);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}
