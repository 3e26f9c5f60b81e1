//! Ratatui UI loop.
//!
//! Keys:
//! - Space: start/stop the metronome
//! - t: start/stop the timer
//! - a: sound the alarm
//! - +/-: tempo up/down
//! - [/]: volume down/up
//! - Tab: next field; digits and `.` type into it, Enter commits, Esc discards
//! - l: toggle timer loop
//! - L: show/hide logs
//! - q: quit

mod app;
mod render;

pub(crate) use app::run_tui;
