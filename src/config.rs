// src/config.rs
//! Configuration management with file-backed storage

use crate::error::{Result, TrailError};
use crate::gps::provider::{Accuracy, WatchOptions};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub source_type: String,  // "gpsd", "serial", "replay"
    pub serial_port: Option<String>,
    pub serial_baudrate: Option<u32>,
    pub gpsd_host: Option<String>,
    pub gpsd_port: Option<u16>,
    pub replay_file: Option<PathBuf>,
    pub replay_interval_ms: Option<u64>,

    pub accuracy: Accuracy,
    pub min_distance_m: f64,
    pub min_interval_ms: u64,
    pub enable_background: bool,

    pub permission_timeout_secs: u64,
    pub position_timeout_secs: u64,
    pub stall_after_secs: u64,

    pub store_path: Option<PathBuf>,
    pub backend_url: Option<String>,
    pub backend_token: Option<String>,
    pub archive_dir: Option<PathBuf>,
    pub submit_attempts: u32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            source_type: "gpsd".to_string(),
            serial_port: None,
            serial_baudrate: Some(9600),
            gpsd_host: Some("localhost".to_string()),
            gpsd_port: Some(2947),
            replay_file: None,
            replay_interval_ms: Some(1000),
            accuracy: Accuracy::High,
            min_distance_m: 3.0,
            min_interval_ms: 1000,
            enable_background: true,
            permission_timeout_secs: 10,
            position_timeout_secs: 15,
            stall_after_secs: 30,
            store_path: None,
            backend_url: None,
            backend_token: None,
            archive_dir: None,
            submit_attempts: 3,
        }
    }
}

impl RecorderConfig {
    /// Load configuration from the config file, falling back to defaults
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)
            .map_err(|e| TrailError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| TrailError::Config(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to the config file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;

        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| TrailError::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| TrailError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&config_path, contents)
            .map_err(|e| TrailError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    fn home_dir() -> Result<PathBuf> {
        std::env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| TrailError::Config("HOME environment variable not set".to_string()))
    }

    /// Get config file path
    pub fn get_config_path() -> Result<PathBuf> {
        Ok(Self::home_dir()?.join(".config").join("trail-recorder").join("config.json"))
    }

    /// Where the in-progress recording is persisted
    pub fn resolved_store_path(&self) -> Result<PathBuf> {
        match &self.store_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::home_dir()?
                .join(".local")
                .join("share")
                .join("trail-recorder")
                .join("recording.json")),
        }
    }

    /// Where finished trails are archived when no backend is configured
    pub fn resolved_archive_dir(&self) -> Result<PathBuf> {
        match &self.archive_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::home_dir()?
                .join(".local")
                .join("share")
                .join("trail-recorder")
                .join("trails")),
        }
    }

    /// Sampling policy handed to both producers
    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            accuracy: self.accuracy,
            min_distance_m: self.min_distance_m,
            min_interval: Duration::from_millis(self.min_interval_ms),
        }
    }

    pub fn permission_timeout(&self) -> Duration {
        Duration::from_secs(self.permission_timeout_secs)
    }

    pub fn position_timeout(&self) -> Duration {
        Duration::from_secs(self.position_timeout_secs)
    }

    pub fn stall_after(&self) -> Duration {
        Duration::from_secs(self.stall_after_secs)
    }

    /// Update configuration with new source settings
    pub fn update_source(&mut self, source_type: &str) {
        self.source_type = source_type.to_string();
    }

    /// Update serial port settings
    pub fn update_serial(&mut self, port: String, baudrate: u32) {
        self.source_type = "serial".to_string();
        self.serial_port = Some(port);
        self.serial_baudrate = Some(baudrate);
    }

    /// Update gpsd settings
    pub fn update_gpsd(&mut self, host: String, port: u16) {
        self.source_type = "gpsd".to_string();
        self.gpsd_host = Some(host);
        self.gpsd_port = Some(port);
    }

    /// Update NMEA replay settings
    pub fn update_replay(&mut self, file: PathBuf, interval_ms: u64) {
        self.source_type = "replay".to_string();
        self.replay_file = Some(file);
        self.replay_interval_ms = Some(interval_ms);
    }

    /// Update the sampling thresholds (distance in meters, interval in milliseconds)
    pub fn update_sampling(&mut self, min_distance_m: f64, min_interval_ms: u64) {
        self.min_distance_m = min_distance_m.max(0.0);
        self.min_interval_ms = min_interval_ms.max(100);
    }
}
