// src/gps/gpsd.rs
//! GPSD client implementation

use super::data::FixState;
use crate::error::{Result, TrailError};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::TcpStream,
};

#[derive(Debug, Deserialize)]
struct GpsdMessage {
    class: String,
    #[serde(flatten)]
    data: HashMap<String, serde_json::Value>,
}

/// Connect to a gpsd daemon and return a stream reader
pub async fn connect_gpsd(host: &str, port: u16) -> Result<BufReader<TcpStream>> {
    let mut stream = TcpStream::connect(format!("{}:{}", host, port))
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => TrailError::Io(e),
            _ => TrailError::Connection(format!("Failed to connect to gpsd at {}:{}: {}", host, port, e)),
        })?;

    // Send WATCH command to start receiving JSON data
    let watch_cmd = "?WATCH={\"enable\":true,\"json\":true}\n";
    stream
        .write_all(watch_cmd.as_bytes())
        .await
        .map_err(|e| TrailError::Connection(format!("Failed to send WATCH command: {}", e)))?;

    Ok(BufReader::new(stream))
}

/// Parse a single line of gpsd JSON data.
///
/// Returns true when the line was a TPV report carrying a position.
pub fn parse_gpsd_json(state: &mut FixState, line: &str) -> Result<bool> {
    let msg: GpsdMessage = serde_json::from_str(line)
        .map_err(|e| TrailError::Parse(format!("Failed to parse gpsd JSON: {}", e)))?;

    match msg.class.as_str() {
        "TPV" => Ok(parse_tpv_message(state, &msg.data)),
        "SKY" => {
            parse_sky_message(state, &msg.data);
            Ok(false)
        }
        "VERSION" => {
            if let Some(version) = msg.data.get("release").and_then(|v| v.as_str()) {
                tracing::info!(version, "Connected to gpsd");
            }
            Ok(false)
        }
        // Ignore unknown message types
        _ => Ok(false),
    }
}

/// Parse TPV (Time Position Velocity) message
fn parse_tpv_message(state: &mut FixState, msg_data: &HashMap<String, serde_json::Value>) -> bool {
    if let Some(mode) = msg_data.get("mode").and_then(|v| v.as_u64()) {
        state.mode = Some(mode as u8);
    }

    state.fix_time = msg_data
        .get("time")
        .and_then(|v| v.as_str())
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc));

    // gpsd reports speed in m/s already
    state.speed = msg_data.get("speed").and_then(|v| v.as_f64());

    state.altitude = msg_data
        .get("altHAE")
        .or_else(|| msg_data.get("alt"))
        .and_then(|v| v.as_f64());

    // Horizontal error estimate: eph when present, else the larger of epx/epy
    state.accuracy = msg_data.get("eph").and_then(|v| v.as_f64()).or_else(|| {
        let epx = msg_data.get("epx").and_then(|v| v.as_f64())?;
        let epy = msg_data.get("epy").and_then(|v| v.as_f64())?;
        Some(epx.max(epy))
    });

    let lat = msg_data.get("lat").and_then(|v| v.as_f64());
    let lon = msg_data.get("lon").and_then(|v| v.as_f64());
    match (lat, lon) {
        (Some(lat), Some(lon)) => {
            state.latitude = Some(lat);
            state.longitude = Some(lon);
            true
        }
        _ => false,
    }
}

/// Parse SKY (satellite data) message
fn parse_sky_message(state: &mut FixState, msg_data: &HashMap<String, serde_json::Value>) {
    if let Some(satellites) = msg_data.get("satellites").and_then(|v| v.as_array()) {
        let used = satellites
            .iter()
            .filter(|sat| sat.get("used").and_then(|v| v.as_bool()).unwrap_or(false))
            .count();
        state.satellites = Some(used.min(u8::MAX as usize) as u8);
    }

    if let Some(hdop) = msg_data.get("hdop").and_then(|v| v.as_f64()) {
        state.hdop = Some(hdop);
    }
}
