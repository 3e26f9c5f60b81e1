//! CPAL-backed output lines.
//!
//! `cpal::Stream` is not `Send`, so each open line parks its stream on a small
//! keeper thread and drives it with play/pause commands over a channel. Samples
//! reach the stream callback through a bounded [`SampleQueue`]; its capacity is
//! the line's device buffer.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;

use anyhow::{Context, Result, anyhow, bail};
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};

use crate::device;
use crate::line::{LineFactory, OutputLine, PcmFormat};
use crate::playback::{self, StreamFlags};
use crate::queue::SampleQueue;

/// Samples buffered ahead of the device callback on each line.
pub const DEFAULT_LINE_BUFFER_SAMPLES: usize = 4096;

/// Opens lines on one CPAL output device.
pub struct CpalLineFactory {
    device: cpal::Device,
    config: cpal::SupportedStreamConfig,
    stream_config: cpal::StreamConfig,
    buffer_samples: usize,
}

impl CpalLineFactory {
    /// Select the device (by substring or the host default) and a config near `target_rate`.
    pub fn new(device_name: Option<&str>, target_rate: u32, buffer_samples: usize) -> Result<Self> {
        let host = cpal::default_host();
        let device = device::pick_device(&host, device_name)?;
        let config = device::pick_output_config(&device, target_rate)?;
        let mut stream_config: cpal::StreamConfig = config.clone().into();
        if let Some(buf) = device::pick_buffer_size(&config) {
            stream_config.buffer_size = buf;
        }
        tracing::info!(
            device = %device.description()?,
            rate_hz = stream_config.sample_rate,
            channels = stream_config.channels,
            sample_format = ?config.sample_format(),
            buffer_size = ?stream_config.buffer_size,
            "output device"
        );
        if stream_config.sample_rate != target_rate {
            tracing::info!(
                target_rate_hz = target_rate,
                rate_hz = stream_config.sample_rate,
                "device does not support the reference rate; tones follow the device"
            );
        }
        Ok(Self {
            device,
            config,
            stream_config,
            buffer_samples: buffer_samples.max(1),
        })
    }
}

impl LineFactory for CpalLineFactory {
    fn format(&self) -> PcmFormat {
        PcmFormat::mono(self.stream_config.sample_rate)
    }

    fn create_line(&self) -> Result<Box<dyn OutputLine>> {
        Ok(Box::new(CpalLine {
            device: self.device.clone(),
            sample_format: self.config.sample_format(),
            stream_config: self.stream_config.clone(),
            buffer_samples: self.buffer_samples,
            open: None,
        }))
    }
}

/// One output stream on a CPAL device.
pub struct CpalLine {
    device: cpal::Device,
    sample_format: cpal::SampleFormat,
    stream_config: cpal::StreamConfig,
    buffer_samples: usize,
    open: Option<OpenStream>,
}

struct OpenStream {
    queue: Arc<SampleQueue>,
    flags: StreamFlags,
    keeper: StreamKeeper,
}

impl CpalLine {
    fn open_stream(&self) -> Result<&OpenStream> {
        let open = self.open.as_ref().ok_or_else(|| anyhow!("output line is not open"))?;
        if open.flags.failed.load(Ordering::Relaxed) {
            bail!("output device reported an error");
        }
        Ok(open)
    }
}

impl OutputLine for CpalLine {
    fn open(&mut self, format: PcmFormat) -> Result<()> {
        if self.open.is_some() {
            return Ok(());
        }
        if format.sample_rate != self.stream_config.sample_rate {
            bail!(
                "line runs at {} Hz, cannot open at {} Hz",
                self.stream_config.sample_rate,
                format.sample_rate
            );
        }
        let queue = Arc::new(SampleQueue::new(self.buffer_samples));
        let flags = StreamFlags::default();
        let keeper = StreamKeeper::spawn(
            self.device.clone(),
            self.stream_config.clone(),
            self.sample_format,
            queue.clone(),
            flags.clone(),
        )?;
        self.open = Some(OpenStream { queue, flags, keeper });
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.is_some()
    }

    fn start(&mut self) -> Result<()> {
        self.open_stream()?.keeper.send(StreamCommand::Play)
    }

    fn write(&mut self, samples: &[i16]) -> Result<()> {
        let open = self.open_stream()?;
        if !open.queue.push_blocking(samples) {
            bail!("output line closed during write");
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        let open = self.open_stream()?;
        if !open.queue.wait_until_empty() {
            bail!("output line closed before draining");
        }
        // The callback has taken the last samples; the device still has one buffer to play.
        std::thread::sleep(device::buffer_duration(&self.stream_config));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(open) = &self.open {
            if let Err(e) = open.keeper.send(StreamCommand::Pause) {
                tracing::debug!("pause output stream: {e:#}");
            }
        }
    }

    fn flush(&mut self) {
        if let Some(open) = &self.open {
            open.queue.clear();
        }
    }

    fn close(&mut self) {
        if let Some(open) = self.open.take() {
            open.queue.close();
            open.keeper.shutdown();
        }
    }
}

impl Drop for CpalLine {
    fn drop(&mut self) {
        self.close();
    }
}

#[derive(Debug, Clone, Copy)]
enum StreamCommand {
    Play,
    Pause,
}

type Ack = Sender<Result<()>>;

/// Thread that owns a `cpal::Stream` for the lifetime of an open line.
struct StreamKeeper {
    cmd_tx: Option<Sender<(StreamCommand, Ack)>>,
    join: Option<JoinHandle<()>>,
}

impl StreamKeeper {
    fn spawn(
        device: cpal::Device,
        stream_config: cpal::StreamConfig,
        sample_format: cpal::SampleFormat,
        queue: Arc<SampleQueue>,
        flags: StreamFlags,
    ) -> Result<Self> {
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let join = std::thread::Builder::new()
            .name("output-stream".into())
            .spawn(move || {
                keeper_main(device, stream_config, sample_format, queue, flags, ready_tx, cmd_rx)
            })
            .context("spawn output stream thread")?;

        let ready = ready_rx
            .recv()
            .map_err(|_| anyhow!("output stream thread exited during setup"))
            .and_then(|r| r);
        let keeper = Self {
            cmd_tx: Some(cmd_tx),
            join: Some(join),
        };
        match ready {
            Ok(()) => Ok(keeper),
            Err(e) => {
                keeper.shutdown();
                Err(e)
            }
        }
    }

    fn send(&self, cmd: StreamCommand) -> Result<()> {
        let tx = self
            .cmd_tx
            .as_ref()
            .ok_or_else(|| anyhow!("output stream is shut down"))?;
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        tx.send((cmd, ack_tx))
            .map_err(|_| anyhow!("output stream thread is gone"))?;
        ack_rx
            .recv()
            .map_err(|_| anyhow!("output stream thread dropped {cmd:?}"))?
    }

    fn shutdown(mut self) {
        drop(self.cmd_tx.take());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn keeper_main(
    device: cpal::Device,
    stream_config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    queue: Arc<SampleQueue>,
    flags: StreamFlags,
    ready_tx: Sender<Result<()>>,
    cmd_rx: Receiver<(StreamCommand, Ack)>,
) {
    let stream =
        match playback::build_output_stream(&device, &stream_config, sample_format, &queue, flags.clone()) {
            Ok(stream) => {
                let _ = ready_tx.send(Ok(()));
                stream
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e.context("build output stream")));
                return;
            }
        };

    while let Ok((cmd, ack)) = cmd_rx.recv() {
        let result = match cmd {
            StreamCommand::Play => stream.play().context("play output stream"),
            StreamCommand::Pause => stream.pause().context("pause output stream"),
        };
        let _ = ack.send(result);
    }

    let underruns = flags.underrun_frames.load(Ordering::Relaxed);
    tracing::debug!(underrun_frames = underruns, "output stream closed");
}
