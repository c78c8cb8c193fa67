// src/session/mod.rs
//! Recording session state, lifecycle and crash recovery

pub mod controller;
pub mod draft;
pub mod recovery;
pub mod state;

pub use controller::{ControllerOptions, SessionController, StopOutcome};
pub use draft::{DiscardReason, DraftTrail, TrailMetadata, TrailRecord, TrailSubmission};
pub use recovery::{RecoveryOutcome, RecoveryReconciler};
pub use state::{LiveStats, Notice, RecordingSession, SessionStatus, TrackingMode};
