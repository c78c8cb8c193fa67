// src/producer/background.rs
//! Background collector: receives batched fixes without touching in-memory state

use super::writer::{SampleOrigin, TrackWriter};
use crate::error::TrailError;
use crate::gps::data::LocationSample;
use crate::gps::provider::BackgroundHandler;
use async_trait::async_trait;

/// Name under which the collector is registered with the location source
pub const BACKGROUND_TASK_NAME: &str = "trail-recorder-background-location";

/// Appends every fix of a batch to the durable track in delivery order.
///
/// Holds only a writer handle so it can keep running when the foreground side is gone.
pub struct BackgroundCollector {
    writer: TrackWriter,
}

impl BackgroundCollector {
    pub fn new(writer: TrackWriter) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl BackgroundHandler for BackgroundCollector {
    async fn on_locations(&self, samples: Vec<LocationSample>) {
        tracing::debug!(count = samples.len(), "Background batch received");
        for sample in samples {
            if !self.writer.append(sample, SampleOrigin::Background).await {
                tracing::warn!("Background batch arrived after recording stopped; dropping");
                return;
            }
        }
    }

    async fn on_error(&self, error: TrailError) {
        // Errors only skip the batch; the next delivery is handled normally
        tracing::warn!(error = %error, "Background location delivery failed");
    }
}
