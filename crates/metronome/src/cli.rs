use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "metronome", version, about = "Metronome and countdown timer")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// Settings file (TOML) with metronome, timer and audio sections
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Samples buffered ahead of the device (smaller => tighter stop, more underrun risk)
    #[arg(long)]
    pub buffer_samples: Option<usize>,

    /// Tempo in beats per minute (10-300)
    #[arg(long)]
    pub bpm: Option<u32>,

    /// Accent every N beats (0 = no accent)
    #[arg(long)]
    pub accent_interval: Option<u32>,

    /// Accented beep pitch in Hz
    #[arg(long)]
    pub accent_freq: Option<f32>,

    /// Normal beep pitch in Hz
    #[arg(long)]
    pub freq: Option<f32>,

    /// Output volume, 0.0-1.0
    #[arg(long)]
    pub volume: Option<f32>,

    /// Also append logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Interactive terminal UI (default)
    Tui,

    /// Play the metronome until Ctrl-C
    Run {
        /// Stop after this many beats
        #[arg(long)]
        beats: Option<u64>,
    },

    /// Count down and sound the alarm at zero
    Timer {
        #[arg(long)]
        minutes: Option<u32>,

        #[arg(long)]
        seconds: Option<u32>,

        /// Restart the countdown after every alarm (until Ctrl-C)
        #[arg(long = "loop")]
        looping: bool,
    },

    /// Play the alarm once and exit
    Alarm,
}

impl Args {
    pub fn command(&self) -> Command {
        self.cmd.clone().unwrap_or(Command::Tui)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_tui() {
        let args = Args::try_parse_from(["metronome"]).unwrap();
        assert_eq!(args.command(), Command::Tui);
        assert!(!args.list_devices);
    }

    #[test]
    fn run_accepts_overrides_and_a_beat_limit() {
        let args =
            Args::try_parse_from(["metronome", "--bpm", "90", "--volume", "0.5", "run", "--beats", "8"])
                .unwrap();
        assert_eq!(args.bpm, Some(90));
        assert_eq!(args.volume, Some(0.5));
        assert_eq!(args.command(), Command::Run { beats: Some(8) });
    }

    #[test]
    fn timer_flags_parse() {
        let args =
            Args::try_parse_from(["metronome", "timer", "--minutes", "1", "--seconds", "30", "--loop"])
                .unwrap();
        assert_eq!(
            args.command(),
            Command::Timer {
                minutes: Some(1),
                seconds: Some(30),
                looping: true,
            }
        );
    }

    #[test]
    fn negative_tempo_is_rejected_by_the_parser() {
        assert!(Args::try_parse_from(["metronome", "--bpm", "-5"]).is_err());
    }
}
