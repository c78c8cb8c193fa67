// src/display/mod.rs
//! Live views of a recording

pub mod terminal;

pub use terminal::TerminalDisplay;

use std::io::IsTerminal;

/// Only draw the dashboard when stdout is an interactive terminal
pub fn should_use_dashboard() -> bool {
    std::io::stdout().is_terminal()
}
