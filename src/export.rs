// src/export.rs
//! Track export to GPX and GeoJSON

use crate::error::{Result, TrailError};
use crate::gps::data::Coordinate;
use crate::session::draft::{DraftTrail, TrailSubmission};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackFormat {
    Gpx,
    GeoJson,
}

impl TrackFormat {
    pub fn extension(&self) -> &str {
        match self {
            TrackFormat::Gpx => "gpx",
            TrackFormat::GeoJson => "geojson",
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            TrackFormat::Gpx => "GPX (GPS Exchange)",
            TrackFormat::GeoJson => "GeoJSON",
        }
    }

    /// Guess the format from a file extension, defaulting to GPX
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("geojson") || ext.eq_ignore_ascii_case("json") => {
                TrackFormat::GeoJson
            }
            _ => TrackFormat::Gpx,
        }
    }
}

impl FromStr for TrackFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gpx" => Ok(TrackFormat::Gpx),
            "geojson" | "json" => Ok(TrackFormat::GeoJson),
            other => Err(format!("unknown export format: {}", other)),
        }
    }
}

/// Render a trail in the given format
pub fn render(trail: &DraftTrail, format: TrackFormat) -> Result<String> {
    if trail.track.is_empty() {
        return Err(TrailError::Other("No points to export".to_string()));
    }

    match format {
        TrackFormat::Gpx => Ok(to_gpx(
            &trail_name(trail),
            trail.metadata.description.as_deref(),
            trail.started_at,
            &trail.track,
        )),
        TrackFormat::GeoJson => to_geojson(trail),
    }
}

pub async fn export_to_file(trail: &DraftTrail, path: &Path, format: TrackFormat) -> Result<()> {
    let content = render(trail, format)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await?;
    tracing::info!(path = %path.display(), format = format.display_name(), "Track exported");
    Ok(())
}

fn trail_name(trail: &DraftTrail) -> String {
    trail.metadata.name.clone().unwrap_or_else(|| trail.default_name())
}

/// GPX for a trail that has already been handed to the backend
pub fn submission_gpx(submission: &TrailSubmission) -> String {
    let name = submission.name.clone().unwrap_or_else(|| "Trail".to_string());
    to_gpx(
        &name,
        submission.description.as_deref(),
        submission.captured_at,
        &submission.path,
    )
}

fn to_gpx(name: &str, description: Option<&str>, time: DateTime<Utc>, track: &[Coordinate]) -> String {
    let mut gpx = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="Trail Recorder" xmlns="http://www.topografix.com/GPX/1/1">
"#);

    gpx.push_str(&format!(
        "  <metadata>\n    <time>{}</time>\n  </metadata>\n",
        time.to_rfc3339()
    ));
    gpx.push_str("  <trk>\n");
    gpx.push_str(&format!("    <name>{}</name>\n", escape_xml(name)));
    if let Some(desc) = description {
        gpx.push_str(&format!("    <desc>{}</desc>\n", escape_xml(desc)));
    }

    gpx.push_str("    <trkseg>\n");
    for point in track {
        gpx.push_str(&format!(
            "      <trkpt lat=\"{}\" lon=\"{}\"/>\n",
            point.latitude, point.longitude
        ));
    }
    gpx.push_str("    </trkseg>\n  </trk>\n</gpx>\n");
    gpx
}

fn to_geojson(trail: &DraftTrail) -> Result<String> {
    // GeoJSON positions are [lon, lat]
    let coordinates: Vec<[f64; 2]> = trail
        .track
        .iter()
        .map(|c| [c.longitude, c.latitude])
        .collect();

    let mut properties = serde_json::json!({
        "name": trail_name(trail),
        "startedAt": trail.started_at.to_rfc3339(),
        "capturedAt": trail.captured_at.to_rfc3339(),
        "distance": trail.distance_m,
        "duration": trail.duration_secs,
        "pace": trail.pace,
        "maxSpeed": trail.max_speed_kmh,
        "maxElevation": trail.max_elevation_m,
    });
    if let Some(ref desc) = trail.metadata.description {
        properties["description"] = serde_json::json!(desc);
    }
    if !trail.metadata.tags.is_empty() {
        properties["tags"] = serde_json::json!(trail.metadata.tags);
    }

    let feature = serde_json::json!({
        "type": "Feature",
        "geometry": {
            "type": "LineString",
            "coordinates": coordinates
        },
        "properties": properties
    });

    Ok(serde_json::to_string_pretty(&feature)?)
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
