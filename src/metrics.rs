// src/metrics.rs
//! Derived motion metrics over a recorded track
//!
//! Everything here is a pure function. Consumers call these on whatever track
//! they currently hold; nothing is cached between calls.

use crate::gps::data::Coordinate;

/// Mean Earth radius used for great-circle distances
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates in meters (haversine)
pub fn haversine_meters(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// Cumulative distance along the track in meters. Tracks shorter than two points are 0.
pub fn total_distance_meters(track: &[Coordinate]) -> f64 {
    track
        .windows(2)
        .map(|pair| haversine_meters(&pair[0], &pair[1]))
        .sum()
}

/// Pace as "m:ss" per kilometer.
///
/// The per-kilometer time is rounded to whole seconds before being split, so
/// the seconds field is always 0..=59.
pub fn pace_min_per_km(distance_meters: f64, duration_seconds: f64) -> String {
    if !(distance_meters > 0.0) || !duration_seconds.is_finite() || duration_seconds <= 0.0 {
        return "0:00".to_string();
    }

    let seconds_per_km = (duration_seconds / (distance_meters / 1000.0)).round() as u64;
    format!("{}:{:02}", seconds_per_km / 60, seconds_per_km % 60)
}

/// Convert m/s to km/h
pub fn speed_kmh(meters_per_second: f64) -> f64 {
    meters_per_second * 3.6
}

/// Average speed over a duration in km/h
pub fn average_speed_kmh(distance_meters: f64, duration_seconds: f64) -> f64 {
    if duration_seconds <= 0.0 {
        return 0.0;
    }
    speed_kmh(distance_meters / duration_seconds)
}

/// "850m" below one kilometer, "1.23km" above
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{:.0}m", meters)
    } else {
        format!("{:.2}km", meters / 1000.0)
    }
}

/// "1h 5m", "5m 3s" or "42s"
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}
