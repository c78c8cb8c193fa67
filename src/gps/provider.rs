// src/gps/provider.rs
//! Location capabilities consumed by the recorder

use super::data::LocationSample;
use crate::error::{Result, TrailError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Desired fix accuracy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accuracy {
    Low,
    Balanced,
    High,
    Best,
}

impl Accuracy {
    /// Largest reported error (meters) a fix may carry and still be used
    pub fn max_error_m(&self) -> f64 {
        match self {
            Accuracy::Low => 500.0,
            Accuracy::Balanced => 100.0,
            Accuracy::High => 30.0,
            Accuracy::Best => 10.0,
        }
    }

    /// Whether a sample's reported error satisfies this accuracy. Unknown error passes.
    pub fn admits(&self, sample: &LocationSample) -> bool {
        sample.accuracy.map_or(true, |err| err <= self.max_error_m())
    }
}

/// Subscription filter: a fix is delivered after moving `min_distance_m`
/// or after `min_interval`, whichever comes first
#[derive(Debug, Clone, PartialEq)]
pub struct WatchOptions {
    pub accuracy: Accuracy,
    pub min_distance_m: f64,
    pub min_interval: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            accuracy: Accuracy::High,
            min_distance_m: 3.0,
            min_interval: Duration::from_secs(1),
        }
    }
}

/// What the platform shows while background tracking is active
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationDescriptor {
    pub title: String,
    pub body: String,
}

impl Default for NotificationDescriptor {
    fn default() -> Self {
        Self {
            title: "Recording trail".to_string(),
            body: "Your walk is being tracked in the background".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BackgroundOptions {
    pub watch: WatchOptions,
    pub notification: NotificationDescriptor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// A live position subscription. Dropping or removing it ends the subscription.
pub struct LocationWatch {
    receiver: mpsc::Receiver<LocationSample>,
    task: Option<JoinHandle<()>>,
}

impl LocationWatch {
    pub fn new(receiver: mpsc::Receiver<LocationSample>, task: Option<JoinHandle<()>>) -> Self {
        Self { receiver, task }
    }

    /// Next delivered fix, or None once the source has ended
    pub async fn next(&mut self) -> Option<LocationSample> {
        self.receiver.recv().await
    }

    /// Unsubscribe
    pub fn remove(mut self) {
        self.stop_task();
    }

    fn stop_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.receiver.close();
    }
}

impl Drop for LocationWatch {
    fn drop(&mut self) {
        self.stop_task();
    }
}

/// Receives fixes delivered outside the foreground watcher
#[async_trait]
pub trait BackgroundHandler: Send + Sync {
    async fn on_locations(&self, samples: Vec<LocationSample>);

    async fn on_error(&self, error: TrailError) {
        tracing::warn!(error = %error, "Background location update failed");
    }
}

/// Registration of a handler that keeps receiving updates independently of the foreground
#[async_trait]
pub trait BackgroundUpdates: Send + Sync {
    async fn register(
        &self,
        task_name: &str,
        options: BackgroundOptions,
        handler: Arc<dyn BackgroundHandler>,
    ) -> Result<()>;

    async fn deregister(&self, task_name: &str) -> Result<()>;

    async fn is_registered(&self, task_name: &str) -> bool;
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Human readable source name for logs and display
    fn name(&self) -> &str;

    async fn request_foreground_permission(&self) -> Result<PermissionStatus>;

    /// Best-effort; sources without background support report Denied
    async fn request_background_permission(&self) -> Result<PermissionStatus> {
        Ok(PermissionStatus::Denied)
    }

    /// One-shot fix. Callers bound the wait.
    async fn current_position(&self, accuracy: Accuracy) -> Result<LocationSample>;

    async fn watch_position(&self, options: WatchOptions) -> Result<LocationWatch>;

    /// None when this source cannot deliver updates in the background
    fn background_updates(&self) -> Option<Arc<dyn BackgroundUpdates>> {
        None
    }
}
