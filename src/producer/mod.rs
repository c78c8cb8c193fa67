// src/producer/mod.rs
//! Sample producers and the single writer they share

pub mod background;
pub mod foreground;
pub mod writer;

pub use background::{BackgroundCollector, BACKGROUND_TASK_NAME};
pub use foreground::ForegroundWatcher;
pub use writer::{SampleOrigin, TrackWriter};
