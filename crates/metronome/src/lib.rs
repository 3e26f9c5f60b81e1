//! Metronome and countdown timer front end.
//!
//! Wires the `tone-player` engine to a shared model, a countdown timer, a
//! terminal UI and a few headless modes.

pub mod cli;
pub mod controller;
pub mod logging;
pub mod model;
pub mod runtime;
pub mod settings;
pub mod timer;
mod ui;
