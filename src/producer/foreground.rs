// src/producer/foreground.rs
//! Foreground watcher: live subscription feeding the in-memory session

use super::writer::{SampleOrigin, TrackWriter};
use crate::gps::provider::LocationWatch;
use crate::session::state::RecordingSession;
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Owns the task draining a `LocationWatch` while the session records
pub struct ForegroundWatcher {
    task: JoinHandle<()>,
}

impl ForegroundWatcher {
    /// Start applying fixes from `watch` to `session`, forwarding new points to `writer`
    pub fn spawn(
        mut watch: LocationWatch,
        session: Arc<RwLock<RecordingSession>>,
        writer: TrackWriter,
    ) -> Self {
        let task = tokio::spawn(async move {
            while let Some(sample) = watch.next().await {
                let appended = session.write().accept_sample(&sample, Utc::now());
                if !appended {
                    continue;
                }

                tracing::debug!(
                    lat = sample.coordinate.latitude,
                    lon = sample.coordinate.longitude,
                    "Foreground fix"
                );

                if !writer.append(sample, SampleOrigin::Foreground).await {
                    tracing::debug!("Track writer closed; foreground watcher exiting");
                    break;
                }
            }
            tracing::info!("Foreground location stream ended");
            watch.remove();
        });

        Self { task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the subscription; the watch is dropped along with the task
    pub async fn stop(mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
    }
}

impl Drop for ForegroundWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}
