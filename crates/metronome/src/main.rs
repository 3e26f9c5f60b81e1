//! `metronome`: a terminal metronome with a countdown timer.
//!
//! ## Modes
//! - `tui` (default): interactive terminal UI.
//! - `run`: play the metronome until Ctrl-C.
//! - `timer`: count down and sound the alarm.
//! - `alarm`: play the alarm once.

use anyhow::Result;
use clap::Parser;

use metronome::cli::{Args, Command};
use metronome::logging::{self, LogTarget};
use metronome::runtime;

fn main() -> Result<()> {
    let args = Args::parse();
    let command = args.command();

    let (log_tx, log_rx) = logging::panel_channel();
    let target = if command == Command::Tui && !args.list_devices {
        LogTarget::Panel(log_tx)
    } else {
        LogTarget::Stderr
    };
    logging::init(target, args.log_file.as_deref())?;

    if args.list_devices {
        return runtime::list_devices();
    }

    let (model, audio) = runtime::resolve(&args)?;
    let app = runtime::build(model, &audio)?;
    match command {
        Command::Tui => runtime::run_tui(app, log_rx),
        Command::Run { beats } => runtime::run_metronome(app, beats),
        Command::Timer { .. } => runtime::run_timer(app),
        Command::Alarm => runtime::run_alarm(app),
    }
}
