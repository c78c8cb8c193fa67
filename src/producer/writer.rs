// src/producer/writer.rs
//! Single writer for the durable track
//!
//! Both producers hand their fixes to one actor task, which applies them to the
//! durable store strictly in the order they arrive on the channel. Nothing else
//! writes the track, peaks or last-update keys while a session is recording.

use crate::gps::data::{Coordinate, LocationSample};
use crate::metrics;
use crate::store::DurableRecordingStore;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOrigin {
    Seed,
    Foreground,
    Background,
}

impl SampleOrigin {
    /// The seed fix comes from the same location client as the foreground watch
    fn is_background(self) -> bool {
        self == SampleOrigin::Background
    }
}

enum WriteCommand {
    Append { sample: LocationSample, origin: SampleOrigin },
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to the writer task. Cheap to clone; every clone feeds the same queue.
#[derive(Clone)]
pub struct TrackWriter {
    tx: mpsc::Sender<WriteCommand>,
}

impl TrackWriter {
    /// Seed the writer from whatever the store already holds and start it
    pub async fn spawn(store: DurableRecordingStore) -> (Self, JoinHandle<()>) {
        let state = WriterState {
            track: store.load_track().await.unwrap_or_default(),
            max_elevation_m: store.load_max_elevation().await.unwrap_or(0.0),
            max_speed_kmh: store.load_max_speed().await.unwrap_or(0.0),
            last_fix: None,
            last_foreground: None,
            last_background: None,
            store,
        };

        let (tx, rx) = mpsc::channel(256);
        let task = tokio::spawn(state.run(rx));
        (Self { tx }, task)
    }

    /// Queue a fix. Returns false once the writer has shut down.
    pub async fn append(&self, sample: LocationSample, origin: SampleOrigin) -> bool {
        self.tx.send(WriteCommand::Append { sample, origin }).await.is_ok()
    }

    /// Resolve once every previously queued fix has been written
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(WriteCommand::Flush(ack)).await.is_ok() {
            let _ = done.await;
        }
    }

    /// Drain the queue and stop; later appends are rejected
    pub async fn shutdown(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(WriteCommand::Shutdown(ack)).await.is_ok() {
            let _ = done.await;
        }
    }
}

struct WriterState {
    store: DurableRecordingStore,
    track: Vec<Coordinate>,
    max_elevation_m: f64,
    max_speed_kmh: f64,
    last_fix: Option<(Coordinate, DateTime<Utc>)>,
    last_foreground: Option<DateTime<Utc>>,
    last_background: Option<DateTime<Utc>>,
}

impl WriterState {
    async fn run(mut self, mut rx: mpsc::Receiver<WriteCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                WriteCommand::Append { sample, origin } => self.apply(sample, origin).await,
                WriteCommand::Flush(ack) => {
                    let _ = ack.send(());
                }
                WriteCommand::Shutdown(ack) => {
                    rx.close();
                    // Anything queued before the shutdown still lands
                    while let Some(pending) = rx.recv().await {
                        match pending {
                            WriteCommand::Append { sample, origin } => self.apply(sample, origin).await,
                            WriteCommand::Flush(ack) | WriteCommand::Shutdown(ack) => {
                                let _ = ack.send(());
                            }
                        }
                    }
                    let _ = ack.send(());
                    break;
                }
            }
        }
        tracing::debug!(points = self.track.len(), "Track writer stopped");
    }

    async fn apply(&mut self, sample: LocationSample, origin: SampleOrigin) {
        let fix = (sample.coordinate, sample.timestamp);
        if self.last_fix == Some(fix) {
            tracing::trace!(?origin, "Dropping fix already written by the other producer");
            return;
        }
        // Fixes no newer than what the other producer already wrote are replays of it
        let (own, other) = if origin.is_background() {
            (&mut self.last_background, self.last_foreground)
        } else {
            (&mut self.last_foreground, self.last_background)
        };
        if other.map_or(false, |seen| sample.timestamp <= seen) {
            tracing::trace!(?origin, "Dropping fix older than the other producer's latest");
            return;
        }
        *own = Some(sample.timestamp);
        self.last_fix = Some(fix);

        self.track.push(sample.coordinate);
        self.store.save_track(&self.track).await;

        if let Some(altitude) = sample.altitude.filter(|a| a.is_finite()) {
            if altitude > self.max_elevation_m {
                self.max_elevation_m = altitude;
                self.store.save_max_elevation(altitude).await;
            }
        }

        if let Some(speed) = sample.positive_speed() {
            let kmh = metrics::speed_kmh(speed);
            if kmh > self.max_speed_kmh {
                self.max_speed_kmh = kmh;
                self.store.save_max_speed(kmh).await;
            }
        }

        self.store.save_last_update(Utc::now()).await;
        tracing::trace!(?origin, points = self.track.len(), "Fix persisted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KeyValueStore, MemoryStore};
    use chrono::Duration;
    use std::sync::Arc;

    fn durable() -> DurableRecordingStore {
        DurableRecordingStore::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_appends_in_order_and_flushes() {
        let store = durable();
        let (writer, _task) = TrackWriter::spawn(store.clone()).await;
        let base = Utc::now();

        for i in 0..5 {
            let sample = LocationSample::new(0.0, i as f64 * 0.001)
                .with_timestamp(base + Duration::seconds(i));
            assert!(writer.append(sample, SampleOrigin::Foreground).await);
        }
        writer.flush().await;

        let track = store.load_track().await.unwrap();
        assert_eq!(track.len(), 5);
        assert_eq!(track[4], Coordinate::new(0.0, 0.004));
        assert!(store.load_last_update().await.is_some());
    }

    #[tokio::test]
    async fn test_same_fix_from_both_producers_written_once() {
        let store = durable();
        let (writer, _task) = TrackWriter::spawn(store.clone()).await;
        let sample = LocationSample::new(1.0, 1.0);

        writer.append(sample.clone(), SampleOrigin::Foreground).await;
        writer.append(sample, SampleOrigin::Background).await;
        writer.flush().await;

        assert_eq!(store.load_track().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replayed_fix_after_newer_one_is_dropped() {
        let store = durable();
        let (writer, _task) = TrackWriter::spawn(store.clone()).await;
        let base = Utc::now();
        let first = LocationSample::new(0.0, 0.0).with_timestamp(base);
        let second = LocationSample::new(0.0, 0.001).with_timestamp(base + Duration::seconds(1));
        let third = LocationSample::new(0.0, 0.002).with_timestamp(base + Duration::seconds(2));

        writer.append(first.clone(), SampleOrigin::Foreground).await;
        writer.append(second.clone(), SampleOrigin::Foreground).await;
        // Background batch repeats both, then brings one the foreground missed
        writer.append(first, SampleOrigin::Background).await;
        writer.append(second, SampleOrigin::Background).await;
        writer.append(third, SampleOrigin::Background).await;
        writer.flush().await;

        assert_eq!(
            store.load_track().await.unwrap(),
            vec![Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 0.001), Coordinate::new(0.0, 0.002)]
        );
    }

    #[tokio::test]
    async fn test_peaks_persisted_as_running_max() {
        let store = durable();
        let (writer, _task) = TrackWriter::spawn(store.clone()).await;
        let base = Utc::now();

        let samples = [
            LocationSample::new(0.0, 0.0).with_altitude(200.0).with_speed(1.0),
            LocationSample::new(0.0, 0.001).with_altitude(150.0).with_speed(3.0),
            LocationSample::new(0.0, 0.002).with_speed(-1.0),
        ];
        for (i, sample) in samples.into_iter().enumerate() {
            let sample = sample.with_timestamp(base + Duration::seconds(i as i64));
            writer.append(sample, SampleOrigin::Background).await;
        }
        writer.flush().await;

        assert_eq!(store.load_max_elevation().await, Some(200.0));
        assert!((store.load_max_speed().await.unwrap() - 10.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_seeded_from_existing_track() {
        let memory = Arc::new(MemoryStore::new());
        memory
            .set("recording.coordinates", r#"[{"latitude":5.0,"longitude":5.0}]"#)
            .await
            .unwrap();
        let store = DurableRecordingStore::new(memory);
        let (writer, _task) = TrackWriter::spawn(store.clone()).await;

        writer.append(LocationSample::new(5.0, 5.001), SampleOrigin::Background).await;
        writer.flush().await;

        assert_eq!(store.load_track().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_drains_then_rejects() {
        let store = durable();
        let (writer, task) = TrackWriter::spawn(store.clone()).await;

        writer.append(LocationSample::new(0.0, 0.0), SampleOrigin::Foreground).await;
        writer.shutdown().await;
        task.await.unwrap();

        assert!(!writer.append(LocationSample::new(0.0, 0.1), SampleOrigin::Foreground).await);
        assert_eq!(store.load_track().await.unwrap().len(), 1);
    }
}
