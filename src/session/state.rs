// src/session/state.rs
//! In-memory recording state and the live view derived from it

use crate::gps::data::{Coordinate, LocationSample};
use crate::metrics;
use crate::store::PersistedSession;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Recording,
    Stopping,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "Idle"),
            SessionStatus::Recording => write!(f, "Recording"),
            SessionStatus::Stopping => write!(f, "Stopping"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingMode {
    /// Foreground watcher and background collector both active
    Full,
    /// Background delivery unavailable or refused
    ForegroundOnly,
}

/// User-facing conditions raised while recording. None of them stop a session.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    AcquiringLocation,
    BackgroundUnavailable,
    BackgroundPermissionDenied,
    BackgroundRegistrationFailed(String),
    BackgroundLeak(String),
    ForegroundUnavailable(String),
    InsufficientData,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::AcquiringLocation => write!(f, "Acquiring location…"),
            Notice::BackgroundUnavailable => {
                write!(f, "Background tracking is not available here; keep the recorder in the foreground")
            }
            Notice::BackgroundPermissionDenied => {
                write!(f, "Background location denied; tracking only while in the foreground")
            }
            Notice::BackgroundRegistrationFailed(msg) => {
                write!(f, "Background tracking could not start ({}); tracking only while in the foreground", msg)
            }
            Notice::BackgroundLeak(msg) => write!(f, "Background tracking may still be registered: {}", msg),
            Notice::ForegroundUnavailable(msg) => write!(f, "Location updates unavailable: {}", msg),
            Notice::InsufficientData => write!(f, "Not enough data recorded; the walk was discarded"),
        }
    }
}

/// Live aggregate state of one recording
#[derive(Debug, Clone, Default)]
pub struct RecordingSession {
    pub started_at: Option<DateTime<Utc>>,
    pub track: Vec<Coordinate>,
    pub current_location: Option<LocationSample>,
    pub max_elevation_m: f64,
    pub max_speed_kmh: f64,
    pub last_update_at: Option<DateTime<Utc>>,
    last_fix: Option<(Coordinate, DateTime<Utc>)>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset everything and mark the start of a new session
    pub fn begin(&mut self, started_at: DateTime<Utc>) {
        *self = Self::default();
        self.started_at = Some(started_at);
    }

    /// Restore state from a persisted in-progress session
    pub fn rehydrate(&mut self, persisted: &PersistedSession) {
        *self = Self::default();
        self.started_at = persisted.started_at;
        self.track = persisted.track.clone().unwrap_or_default();
        self.max_elevation_m = persisted.max_elevation_m.unwrap_or(0.0);
        self.max_speed_kmh = persisted.max_speed_kmh.unwrap_or(0.0);
        self.last_update_at = persisted.last_update_at;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Apply a fix: update the current location, append to the track and raise the peaks.
    ///
    /// The same fix delivered twice (equal coordinate and timestamp) is not appended
    /// again. Returns whether the track grew.
    pub fn accept_sample(&mut self, sample: &LocationSample, now: DateTime<Utc>) -> bool {
        self.current_location = Some(sample.clone());

        let fix = (sample.coordinate, sample.timestamp);
        if self.last_fix == Some(fix) {
            return false;
        }
        self.last_fix = Some(fix);
        self.track.push(sample.coordinate);
        self.last_update_at = Some(now);

        if let Some(altitude) = sample.altitude.filter(|a| a.is_finite()) {
            self.max_elevation_m = self.max_elevation_m.max(altitude);
        }
        if let Some(speed) = sample.positive_speed() {
            self.max_speed_kmh = self.max_speed_kmh.max(metrics::speed_kmh(speed));
        }
        true
    }

    /// Wall-clock seconds since start; never derived from a tick count
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        self.started_at
            .map(|start| now.signed_duration_since(start).num_seconds().max(0) as u64)
            .unwrap_or(0)
    }

    pub fn distance_m(&self) -> f64 {
        metrics::total_distance_meters(&self.track)
    }

    pub fn live_stats(
        &self,
        status: SessionStatus,
        mode: TrackingMode,
        notices: &[Notice],
        stall_after: Duration,
        now: DateTime<Utc>,
    ) -> LiveStats {
        let elapsed_secs = self.elapsed_secs(now);
        let distance_m = self.distance_m();
        let last_update_age_secs = self
            .last_update_at
            .map(|at| now.signed_duration_since(at).num_seconds().max(0) as u64);
        let stalled = status == SessionStatus::Recording
            && last_update_age_secs
                .or(Some(elapsed_secs))
                .map_or(false, |age| age >= stall_after.as_secs());

        LiveStats {
            status,
            tracking_mode: mode,
            elapsed_secs,
            distance_m,
            pace: metrics::pace_min_per_km(distance_m, elapsed_secs as f64),
            current_speed_kmh: self
                .current_location
                .as_ref()
                .and_then(|s| s.positive_speed())
                .map(metrics::speed_kmh)
                .unwrap_or(0.0),
            max_speed_kmh: self.max_speed_kmh,
            max_elevation_m: self.max_elevation_m,
            points: self.track.len(),
            current_location: self.current_location.as_ref().map(|s| s.coordinate),
            last_update_age_secs,
            stalled,
            notices: notices.to_vec(),
        }
    }
}

/// Snapshot published to the display once per second
#[derive(Debug, Clone, PartialEq)]
pub struct LiveStats {
    pub status: SessionStatus,
    pub tracking_mode: TrackingMode,
    pub elapsed_secs: u64,
    pub distance_m: f64,
    pub pace: String,
    pub current_speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub max_elevation_m: f64,
    pub points: usize,
    pub current_location: Option<Coordinate>,
    pub last_update_age_secs: Option<u64>,
    /// No sample accepted for longer than the configured stall window
    pub stalled: bool,
    pub notices: Vec<Notice>,
}

impl LiveStats {
    pub fn idle() -> Self {
        Self {
            status: SessionStatus::Idle,
            tracking_mode: TrackingMode::ForegroundOnly,
            elapsed_secs: 0,
            distance_m: 0.0,
            pace: "0:00".to_string(),
            current_speed_kmh: 0.0,
            max_speed_kmh: 0.0,
            max_elevation_m: 0.0,
            points: 0,
            current_location: None,
            last_update_age_secs: None,
            stalled: false,
            notices: Vec::new(),
        }
    }

    pub fn formatted_distance(&self) -> String {
        metrics::format_distance(self.distance_m)
    }

    pub fn formatted_duration(&self) -> String {
        metrics::format_duration(self.elapsed_secs)
    }
}
