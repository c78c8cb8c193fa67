// src/error.rs
//! Error types for the trail recorder

use std::fmt;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, TrailError>;

/// Which location permission was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionScope {
    Foreground,
    Background,
}

impl fmt::Display for PermissionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionScope::Foreground => write!(f, "foreground"),
            PermissionScope::Background => write!(f, "background"),
        }
    }
}

#[derive(Debug)]
pub enum TrailError {
    Io(std::io::Error),
    Serial(tokio_serial::Error),
    Json(serde_json::Error),
    Http(reqwest::Error),
    Connection(String),
    Parse(String),
    PermissionDenied(PermissionScope),
    Timeout(&'static str, Duration),
    LocationUnavailable(String),
    Persistence(String),
    Submit(String),
    InvalidState { action: &'static str, state: String },
    Config(String),
    Other(String),
}

impl TrailError {
    /// Whether the failed operation can be attempted again without losing data
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TrailError::Submit(_) | TrailError::Http(_) | TrailError::Timeout(..)
        )
    }
}

impl fmt::Display for TrailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrailError::Io(e) => write!(f, "IO error: {}", e),
            TrailError::Serial(e) => write!(f, "Serial error: {}", e),
            TrailError::Json(e) => write!(f, "JSON error: {}", e),
            TrailError::Http(e) => write!(f, "HTTP error: {}", e),
            TrailError::Connection(msg) => write!(f, "Connection error: {}", msg),
            TrailError::Parse(msg) => write!(f, "Parse error: {}", msg),
            TrailError::PermissionDenied(scope) => {
                write!(f, "Location permission denied ({}). Allow location access to record trails.", scope)
            }
            TrailError::Timeout(what, after) => {
                write!(f, "Timed out after {:.0}s waiting for {}", after.as_secs_f64(), what)
            }
            TrailError::LocationUnavailable(msg) => write!(f, "Location unavailable: {}", msg),
            TrailError::Persistence(msg) => write!(f, "Persistence error: {}", msg),
            TrailError::Submit(msg) => write!(f, "Failed to save trail: {}", msg),
            TrailError::InvalidState { action, state } => {
                write!(f, "Cannot {} while session is {}", action, state)
            }
            TrailError::Config(msg) => write!(f, "Configuration error: {}", msg),
            TrailError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for TrailError {}

impl From<std::io::Error> for TrailError {
    fn from(error: std::io::Error) -> Self {
        TrailError::Io(error)
    }
}

impl From<tokio_serial::Error> for TrailError {
    fn from(error: tokio_serial::Error) -> Self {
        TrailError::Serial(error)
    }
}

impl From<serde_json::Error> for TrailError {
    fn from(error: serde_json::Error) -> Self {
        TrailError::Json(error)
    }
}

impl From<reqwest::Error> for TrailError {
    fn from(error: reqwest::Error) -> Self {
        TrailError::Http(error)
    }
}

impl From<anyhow::Error> for TrailError {
    fn from(error: anyhow::Error) -> Self {
        TrailError::Other(error.to_string())
    }
}
