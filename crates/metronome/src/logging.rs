//! Log subscriber setup.
//!
//! Headless modes log to stderr. The TUI owns the terminal, so there each
//! formatted line is sent over a bounded channel to the log panel instead.
//! `--log-file` adds a plain-text file layer in either case.

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub const DEFAULT_FILTER: &str = "info,metronome=info,tone_player=info";

/// Lines held for the log panel before new ones are dropped.
pub const PANEL_BACKLOG: usize = 500;

pub enum LogTarget {
    Stderr,
    Panel(Sender<String>),
}

/// Channel feeding the TUI log panel.
pub fn panel_channel() -> (Sender<String>, Receiver<String>) {
    crossbeam_channel::bounded(PANEL_BACKLOG)
}

pub fn init(target: LogTarget, log_file: Option<&Path>) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let file_layer = match log_file {
        Some(path) => {
            let file = File::options()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {:?}", path))?;
            Some(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        }
        None => None,
    };
    let (stderr_layer, panel_layer) = match target {
        LogTarget::Stderr => (Some(fmt::layer().with_writer(io::stderr)), None),
        LogTarget::Panel(tx) => (
            None,
            Some(
                fmt::layer()
                    .with_writer(PanelWriter { tx })
                    .with_ansi(false)
                    .with_target(false)
                    .without_time(),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(panel_layer)
        .with(file_layer)
        .try_init()
        .context("install log subscriber")
}

/// `MakeWriter` that turns each formatted event into one panel line.
#[derive(Clone)]
struct PanelWriter {
    tx: Sender<String>,
}

impl<'a> MakeWriter<'a> for PanelWriter {
    type Writer = PanelLine;

    fn make_writer(&'a self) -> Self::Writer {
        PanelLine {
            tx: self.tx.clone(),
            buf: Vec::new(),
        }
    }
}

/// Buffers one event; the line is sent when the writer is dropped.
struct PanelLine {
    tx: Sender<String>,
    buf: Vec<u8>,
}

impl io::Write for PanelLine {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for PanelLine {
    fn drop(&mut self) {
        let line = String::from_utf8_lossy(&self.buf);
        let line = line.trim_end();
        if !line.is_empty() {
            let _ = self.tx.try_send(line.to_string());
        }
    }
}
