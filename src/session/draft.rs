// src/session/draft.rs
//! Finished-but-unsaved trails and the records exchanged with the backend

use crate::gps::data::Coordinate;
use crate::metrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Moderate,
    Hard,
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "moderate" | "medium" => Ok(Difficulty::Moderate),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty: {}", other)),
        }
    }
}

/// What the user fills in on the save form
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrailMetadata {
    pub name: Option<String>,
    pub description: Option<String>,
    pub photo: Option<String>,
    pub tags: Vec<String>,
    pub difficulty: Option<Difficulty>,
    pub city: Option<String>,
    pub country: Option<String>,
}

/// Why a stopped session produced no draft
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    InsufficientData,
    Cancelled,
}

/// A stopped session's metrics plus user metadata, not yet persisted anywhere
#[derive(Debug, Clone, PartialEq)]
pub struct DraftTrail {
    pub id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub track: Vec<Coordinate>,
    pub distance_m: f64,
    pub duration_secs: u64,
    pub pace: String,
    pub avg_speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub max_elevation_m: f64,
    pub metadata: TrailMetadata,
}

impl DraftTrail {
    /// Build a draft from the final track; distance and pace are computed from exactly this track
    pub fn from_final_track(
        started_at: DateTime<Utc>,
        captured_at: DateTime<Utc>,
        track: Vec<Coordinate>,
        max_speed_kmh: f64,
        max_elevation_m: f64,
    ) -> Self {
        let duration_secs = captured_at.signed_duration_since(started_at).num_seconds().max(0) as u64;
        let distance_m = metrics::total_distance_meters(&track);

        Self {
            id: Uuid::new_v4(),
            captured_at,
            started_at,
            pace: metrics::pace_min_per_km(distance_m, duration_secs as f64),
            avg_speed_kmh: metrics::average_speed_kmh(distance_m, duration_secs as f64),
            track,
            distance_m,
            duration_secs,
            max_speed_kmh,
            max_elevation_m,
            metadata: TrailMetadata::default(),
        }
    }

    /// Merge form input; empty fields keep what is already there
    pub fn apply_metadata(&mut self, metadata: TrailMetadata) {
        let current = &mut self.metadata;
        if let Some(name) = metadata.name.filter(|n| !n.trim().is_empty()) {
            current.name = Some(name.trim().to_string());
        }
        if metadata.description.is_some() {
            current.description = metadata.description;
        }
        if metadata.photo.is_some() {
            current.photo = metadata.photo;
        }
        if !metadata.tags.is_empty() {
            current.tags = metadata.tags;
        }
        if metadata.difficulty.is_some() {
            current.difficulty = metadata.difficulty;
        }
        if metadata.city.is_some() {
            current.city = metadata.city;
        }
        if metadata.country.is_some() {
            current.country = metadata.country;
        }
    }

    /// Name shown when the user left it blank
    pub fn default_name(&self) -> String {
        format!("Walk {}", self.started_at.format("%Y-%m-%d %H:%M"))
    }

    pub fn to_submission(&self) -> TrailSubmission {
        TrailSubmission {
            id: self.id,
            captured_at: self.captured_at,
            distance: self.distance_m,
            duration: self.duration_secs,
            path: self.track.clone(),
            pace: Some(self.pace.clone()),
            avg_speed: Some(self.avg_speed_kmh),
            max_speed: Some(self.max_speed_kmh),
            max_elevation: Some(self.max_elevation_m),
            name: Some(self.metadata.name.clone().unwrap_or_else(|| self.default_name())),
            description: self.metadata.description.clone(),
            photo: self.metadata.photo.clone(),
            tags: self.metadata.tags.clone(),
            difficulty: self.metadata.difficulty,
            city: self.metadata.city.clone(),
            country: self.metadata.country.clone(),
        }
    }
}

/// Body posted to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailSubmission {
    pub id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub distance: f64,      // meters
    pub duration: u64,      // seconds
    pub path: Vec<Coordinate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_elevation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// The backend's persisted trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub captured_at: DateTime<Utc>,
    pub distance: f64,
    pub duration: u64,
    #[serde(default)]
    pub path: Vec<Coordinate>,
}

impl From<&TrailSubmission> for TrailRecord {
    fn from(submission: &TrailSubmission) -> Self {
        Self {
            id: submission.id.to_string(),
            name: submission.name.clone(),
            captured_at: submission.captured_at,
            distance: submission.distance,
            duration: submission.duration,
            path: submission.path.clone(),
        }
    }
}
