// src/gps/data.rs
//! Location sample structures

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A recorded point on a track. Immutable once recorded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Whether the coordinate lies within valid WGS84 bounds
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// One position report from a location source.
///
/// Optional fields are absent when the receiver did not report them. An absent
/// altitude never updates the elevation peak; an absent or non-positive speed
/// never updates the speed peak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub coordinate: Coordinate,
    pub altitude: Option<f64>,  // meters
    pub speed: Option<f64>,     // m/s
    pub accuracy: Option<f64>,  // meters
    pub timestamp: DateTime<Utc>,
}

impl LocationSample {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            coordinate: Coordinate::new(latitude, longitude),
            altitude: None,
            speed: None,
            accuracy: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed = Some(speed_mps);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Speed usable for the running maximum, if any
    pub fn positive_speed(&self) -> Option<f64> {
        self.speed.filter(|s| s.is_finite() && *s > 0.0)
    }
}

/// Receiver state accumulated across sentences until a position can be emitted
#[derive(Debug, Clone, Default)]
pub struct FixState {
    pub fix_time: Option<DateTime<Utc>>,
    pub fix_date: Option<NaiveDate>,    // last date seen in an RMC sentence
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,      // m/s
    pub accuracy: Option<f64>,   // meters
    pub fix_quality: Option<u8>,
    pub mode: Option<u8>,
    pub hdop: Option<f64>,
    pub satellites: Option<u8>,
}

impl FixState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the state represents a valid position fix
    pub fn has_fix(&self) -> bool {
        if self.latitude.is_none() || self.longitude.is_none() {
            return false;
        }
        match (self.fix_quality, self.mode) {
            (Some(0), _) => false,
            (_, Some(m)) if m < 2 => false,
            _ => true,
        }
    }

    /// Build a sample from the current fix; arrival time stands in for a missing fix time
    pub fn to_sample(&self) -> Option<LocationSample> {
        if !self.has_fix() {
            return None;
        }
        let coordinate = Coordinate::new(self.latitude?, self.longitude?);
        if !coordinate.is_valid() {
            return None;
        }

        Some(LocationSample {
            coordinate,
            altitude: self.altitude,
            speed: self.speed,
            accuracy: self.accuracy.or_else(|| self.hdop.map(|h| h * 5.0)),
            timestamp: self.fix_time.unwrap_or_else(Utc::now),
        })
    }

    /// Get fix type description
    pub fn get_fix_description(&self) -> String {
        if let Some(quality) = self.fix_quality {
            match quality {
                0 => "No fix".to_string(),
                1 => "GPS".to_string(),
                2 => "DGPS".to_string(),
                4 => "RTK".to_string(),
                5 => "Float RTK".to_string(),
                6 => "Estimated".to_string(),
                _ => format!("Unknown ({})", quality),
            }
        } else if let Some(m) = self.mode {
            match m {
                1 => "No fix".to_string(),
                2 => "2D fix".to_string(),
                3 => "3D fix".to_string(),
                _ => format!("Mode {}", m),
            }
        } else {
            "Unknown".to_string()
        }
    }
}
