// src/lib.rs
//! Trail Recorder Library
//!
//! Records GPS walks from gpsd, serial NMEA receivers or NMEA logs, persisting
//! every accepted fix so an interrupted session can be resumed.

pub mod api;
pub mod config;
pub mod display;
pub mod error;
pub mod export;
pub mod gps;
pub mod metrics;
pub mod producer;
pub mod recorder;
pub mod session;
pub mod store;

// Re-export main types for convenience
pub use error::{Result, TrailError};
pub use gps::data::{Coordinate, LocationSample};
pub use session::{
    DraftTrail, LiveStats, RecoveryOutcome, RecoveryReconciler, SessionController, SessionStatus,
    StopOutcome,
};
pub use store::{DurableRecordingStore, KeyValueStore};
