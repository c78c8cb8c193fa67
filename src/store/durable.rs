// src/store/durable.rs
//! Typed persistence of the in-progress recording

use super::KeyValueStore;
use crate::error::{Result, TrailError};
use crate::gps::data::Coordinate;
use crate::session::draft::TrailSubmission;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

/// Durable keys for the session's mutable fields, one flat namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKey {
    StartedAt,
    Coordinates,
    MaxElevation,
    MaxSpeed,
    LastUpdate,
}

impl StoreKey {
    pub const ALL: [StoreKey; 5] = [
        StoreKey::StartedAt,
        StoreKey::Coordinates,
        StoreKey::MaxElevation,
        StoreKey::MaxSpeed,
        StoreKey::LastUpdate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKey::StartedAt => "recording.started_at",
            StoreKey::Coordinates => "recording.coordinates",
            StoreKey::MaxElevation => "recording.max_elevation",
            StoreKey::MaxSpeed => "recording.max_speed",
            StoreKey::LastUpdate => "recording.last_update",
        }
    }
}

/// A stopped trail whose upload failed. Lives apart from the session keys,
/// so `clear_all` leaves it alone.
pub const PENDING_UPLOAD_KEY: &str = "upload.pending";

/// Everything the store holds about a session, each field independently optional
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedSession {
    pub started_at: Option<DateTime<Utc>>,
    pub track: Option<Vec<Coordinate>>,
    pub max_elevation_m: Option<f64>,
    pub max_speed_kmh: Option<f64>,
    pub last_update_at: Option<DateTime<Utc>>,
}

impl PersistedSession {
    /// A session is in progress only when both the start time and a non-empty track exist
    pub fn is_in_progress(&self) -> bool {
        self.started_at.is_some() && self.track.as_ref().map_or(false, |t| !t.is_empty())
    }

    /// Some but not all of the in-progress markers are present
    pub fn is_partial(&self) -> bool {
        !self.is_in_progress() && (self.started_at.is_some() || self.track.is_some())
    }

    pub fn point_count(&self) -> usize {
        self.track.as_ref().map_or(0, Vec::len)
    }
}

/// Wraps a `KeyValueStore` with typed recording fields.
///
/// Writes are best-effort: failures are logged and swallowed. Reads that fail or
/// hold malformed values are treated as absent.
#[derive(Clone)]
pub struct DurableRecordingStore {
    inner: Arc<dyn KeyValueStore>,
}

impl DurableRecordingStore {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    pub async fn save_field(&self, key: StoreKey, value: &str) {
        if let Err(e) = self.inner.set(key.as_str(), value).await {
            tracing::warn!(key = key.as_str(), error = %e, "Failed to persist recording field");
        }
    }

    pub async fn load_field(&self, key: StoreKey) -> Option<String> {
        match self.inner.get(key.as_str()).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = key.as_str(), error = %e, "Failed to read recording field");
                None
            }
        }
    }

    /// Remove every recording key as one unit
    pub async fn clear_all(&self) -> Result<()> {
        let keys: Vec<&str> = StoreKey::ALL.iter().map(|k| k.as_str()).collect();
        self.inner
            .remove_many(&keys)
            .await
            .map_err(|e| TrailError::Persistence(format!("Failed to clear recording: {}", e)))
    }

    pub async fn save_track(&self, track: &[Coordinate]) {
        match serde_json::to_string(track) {
            Ok(json) => self.save_field(StoreKey::Coordinates, &json).await,
            Err(e) => tracing::warn!(error = %e, "Failed to serialize track"),
        }
    }

    pub async fn load_track(&self) -> Option<Vec<Coordinate>> {
        let raw = self.load_field(StoreKey::Coordinates).await?;
        match serde_json::from_str::<Vec<Coordinate>>(&raw) {
            Ok(track) => Some(track),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed persisted track");
                None
            }
        }
    }

    pub async fn save_max_elevation(&self, meters: f64) {
        self.save_field(StoreKey::MaxElevation, &meters.to_string()).await;
    }

    pub async fn load_max_elevation(&self) -> Option<f64> {
        self.load_float(StoreKey::MaxElevation).await
    }

    pub async fn save_max_speed(&self, kmh: f64) {
        self.save_field(StoreKey::MaxSpeed, &kmh.to_string()).await;
    }

    pub async fn load_max_speed(&self) -> Option<f64> {
        self.load_float(StoreKey::MaxSpeed).await
    }

    pub async fn save_started_at(&self, at: DateTime<Utc>) {
        self.save_field(StoreKey::StartedAt, &at.timestamp_millis().to_string()).await;
    }

    pub async fn load_started_at(&self) -> Option<DateTime<Utc>> {
        self.load_millis(StoreKey::StartedAt).await
    }

    pub async fn save_last_update(&self, at: DateTime<Utc>) {
        self.save_field(StoreKey::LastUpdate, &at.timestamp_millis().to_string()).await;
    }

    pub async fn load_last_update(&self) -> Option<DateTime<Utc>> {
        self.load_millis(StoreKey::LastUpdate).await
    }

    /// Keep the exact submission for a later upload. Unlike the session fields this
    /// reports failure, since the caller drops the session once it succeeds.
    pub async fn save_pending_upload(&self, submission: &TrailSubmission) -> Result<()> {
        let json = serde_json::to_string(submission)?;
        self.inner
            .set(PENDING_UPLOAD_KEY, &json)
            .await
            .map_err(|e| TrailError::Persistence(format!("Failed to keep trail for upload: {}", e)))
    }

    pub async fn load_pending_upload(&self) -> Option<TrailSubmission> {
        let raw = match self.inner.get(PENDING_UPLOAD_KEY).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read pending upload");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(submission) => Some(submission),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed pending upload");
                None
            }
        }
    }

    pub async fn clear_pending_upload(&self) -> Result<()> {
        self.inner.remove(PENDING_UPLOAD_KEY).await
    }

    pub async fn load_snapshot(&self) -> PersistedSession {
        PersistedSession {
            started_at: self.load_started_at().await,
            track: self.load_track().await,
            max_elevation_m: self.load_max_elevation().await,
            max_speed_kmh: self.load_max_speed().await,
            last_update_at: self.load_last_update().await,
        }
    }

    async fn load_float(&self, key: StoreKey) -> Option<f64> {
        let raw = self.load_field(key).await?;
        match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => Some(value),
            _ => {
                tracing::warn!(key = key.as_str(), value = %raw, "Ignoring malformed persisted number");
                None
            }
        }
    }

    async fn load_millis(&self, key: StoreKey) -> Option<DateTime<Utc>> {
        let raw = self.load_field(key).await?;
        let parsed = raw
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single());
        if parsed.is_none() {
            tracing::warn!(key = key.as_str(), value = %raw, "Ignoring malformed persisted timestamp");
        }
        parsed
    }
}
