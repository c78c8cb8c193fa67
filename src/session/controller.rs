// src/session/controller.rs
//! Recording lifecycle: Idle -> Recording -> Stopping -> Idle

use super::draft::{DiscardReason, DraftTrail, TrailMetadata, TrailRecord};
use super::state::{LiveStats, Notice, RecordingSession, SessionStatus, TrackingMode};
use crate::api::TrailApi;
use crate::config::RecorderConfig;
use crate::error::{PermissionScope, Result, TrailError};
use crate::gps::provider::{
    BackgroundHandler, BackgroundOptions, BackgroundUpdates, LocationProvider,
    NotificationDescriptor, PermissionStatus, WatchOptions,
};
use crate::producer::{
    BackgroundCollector, ForegroundWatcher, SampleOrigin, TrackWriter, BACKGROUND_TASK_NAME,
};
use crate::store::{DurableRecordingStore, PersistedSession};
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{timeout, MissedTickBehavior};

/// Tunables for one controller
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub watch: WatchOptions,
    pub notification: NotificationDescriptor,
    pub enable_background: bool,
    pub permission_timeout: Duration,
    pub position_timeout: Duration,
    pub stall_after: Duration,
    pub tick_interval: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            watch: WatchOptions::default(),
            notification: NotificationDescriptor::default(),
            enable_background: true,
            permission_timeout: Duration::from_secs(10),
            position_timeout: Duration::from_secs(15),
            stall_after: Duration::from_secs(30),
            tick_interval: Duration::from_secs(1),
        }
    }
}

impl ControllerOptions {
    pub fn from_config(config: &RecorderConfig) -> Self {
        Self {
            watch: config.watch_options(),
            enable_background: config.enable_background,
            permission_timeout: config.permission_timeout(),
            position_timeout: config.position_timeout(),
            stall_after: config.stall_after(),
            ..Self::default()
        }
    }
}

/// Result of stopping a recording
#[derive(Debug, Clone, PartialEq)]
pub enum StopOutcome {
    /// Nothing worth saving; durable state already cleared and the controller is Idle
    Discarded(DiscardReason),
    /// Metrics computed; the controller waits in Stopping for submit or cancel
    Draft(DraftTrail),
}

pub struct SessionController {
    options: ControllerOptions,
    store: DurableRecordingStore,
    provider: Arc<dyn LocationProvider>,
    api: Arc<dyn TrailApi>,

    status: SessionStatus,
    mode: TrackingMode,
    session: Arc<RwLock<RecordingSession>>,
    notices: Arc<RwLock<Vec<Notice>>>,
    draft: Option<DraftTrail>,

    writer: Option<(TrackWriter, JoinHandle<()>)>,
    watcher: Option<ForegroundWatcher>,
    background: Option<Arc<dyn BackgroundUpdates>>,
    ticker: Option<JoinHandle<()>>,
    stats: Arc<watch::Sender<LiveStats>>,
}

impl SessionController {
    pub fn new(
        options: ControllerOptions,
        store: DurableRecordingStore,
        provider: Arc<dyn LocationProvider>,
        api: Arc<dyn TrailApi>,
    ) -> Self {
        let (stats, _) = watch::channel(LiveStats::idle());
        Self {
            options,
            store,
            provider,
            api,
            status: SessionStatus::Idle,
            mode: TrackingMode::ForegroundOnly,
            session: Arc::new(RwLock::new(RecordingSession::new())),
            notices: Arc::new(RwLock::new(Vec::new())),
            draft: None,
            writer: None,
            watcher: None,
            background: None,
            ticker: None,
            stats: Arc::new(stats),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn tracking_mode(&self) -> TrackingMode {
        self.mode
    }

    pub fn draft(&self) -> Option<&DraftTrail> {
        self.draft.as_ref()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.read().clone()
    }

    pub fn store(&self) -> &DurableRecordingStore {
        &self.store
    }

    /// Updates published once per second while recording, and on every transition
    pub fn subscribe(&self) -> watch::Receiver<LiveStats> {
        self.stats.subscribe()
    }

    pub fn live_stats(&self) -> LiveStats {
        if self.status == SessionStatus::Idle {
            let mut stats = LiveStats::idle();
            stats.notices = self.notices();
            return stats;
        }
        self.session.read().live_stats(
            self.status,
            self.mode,
            &self.notices.read(),
            self.options.stall_after,
            Utc::now(),
        )
    }

    /// Begin a new recording. Any residue of an earlier session is cleared first.
    pub async fn start(&mut self) -> Result<()> {
        self.ensure(SessionStatus::Idle, "start")?;
        self.request_foreground_permission().await?;

        self.notices.write().clear();
        let background = self.prepare_background().await;

        if let Err(e) = self.store.clear_all().await {
            tracing::warn!(error = %e, "Could not clear previous recording");
        }
        let started_at = Utc::now();
        self.store.save_started_at(started_at).await;
        self.session.write().begin(started_at);

        let (writer, writer_task) = TrackWriter::spawn(self.store.clone()).await;
        self.seed_position(&writer).await;
        self.activate(writer, writer_task, background, true).await;

        self.status = SessionStatus::Recording;
        tracing::info!(
            provider = self.provider.name(),
            mode = ?self.mode,
            "Recording started"
        );
        self.publish();
        Ok(())
    }

    /// Continue a session found in the durable store without clearing it
    pub async fn resume(&mut self, persisted: PersistedSession) -> Result<()> {
        self.ensure(SessionStatus::Idle, "resume")?;
        if !persisted.is_in_progress() {
            return Err(TrailError::Other("No recording in progress to resume".to_string()));
        }

        self.notices.write().clear();
        let foreground = match self.request_foreground_permission().await {
            Ok(()) => true,
            Err(e) => {
                // The durable session is still worth keeping; record what we can
                tracing::warn!(error = %e, "Resuming without foreground updates");
                self.push_notice(Notice::ForegroundUnavailable(e.to_string()));
                false
            }
        };
        let background = self.prepare_background().await;

        self.session.write().rehydrate(&persisted);
        let (writer, writer_task) = TrackWriter::spawn(self.store.clone()).await;
        self.activate(writer, writer_task, background, foreground).await;

        self.status = SessionStatus::Recording;
        tracing::info!(
            points = persisted.point_count(),
            mode = ?self.mode,
            "Recording resumed"
        );
        self.publish();
        Ok(())
    }

    /// Stop producers and compute the final trail from the durable track
    pub async fn stop(&mut self) -> Result<StopOutcome> {
        self.ensure(SessionStatus::Recording, "stop")?;
        self.status = SessionStatus::Stopping;
        self.teardown().await;

        let captured_at = Utc::now();
        let persisted = self.store.load_snapshot().await;
        let memory = self.session.read().clone();

        // Durable is the union of both producers; memory covers failed writes
        let track = match persisted.track {
            Some(track) if track.len() >= memory.track.len() => track,
            _ => memory.track.clone(),
        };
        let started_at = persisted
            .started_at
            .or(memory.started_at)
            .unwrap_or(captured_at);
        let max_speed_kmh = persisted.max_speed_kmh.unwrap_or(0.0).max(memory.max_speed_kmh);
        let max_elevation_m = persisted
            .max_elevation_m
            .unwrap_or(0.0)
            .max(memory.max_elevation_m);

        if track.len() < 2 {
            tracing::info!(points = track.len(), "Not enough points; discarding recording");
            self.finish().await;
            self.push_notice(Notice::InsufficientData);
            self.publish();
            return Ok(StopOutcome::Discarded(DiscardReason::InsufficientData));
        }

        let draft = DraftTrail::from_final_track(
            started_at,
            captured_at,
            track,
            max_speed_kmh,
            max_elevation_m,
        );
        tracing::info!(
            points = draft.track.len(),
            distance_m = draft.distance_m,
            duration_secs = draft.duration_secs,
            "Recording stopped"
        );
        self.draft = Some(draft.clone());
        self.publish();
        Ok(StopOutcome::Draft(draft))
    }

    /// Save the draft. On failure nothing is lost and the call may be repeated.
    pub async fn submit(&mut self, metadata: TrailMetadata) -> Result<TrailRecord> {
        self.ensure(SessionStatus::Stopping, "submit")?;
        let draft = self.draft.as_mut().ok_or_else(|| TrailError::InvalidState {
            action: "submit",
            state: "Stopping without a draft".to_string(),
        })?;
        draft.apply_metadata(metadata);
        let submission = draft.to_submission();

        match self.api.create_trail(&submission).await {
            Ok(record) => {
                tracing::info!(id = %record.id, "Trail saved");
                self.finish().await;
                self.publish();
                Ok(record)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Trail submission failed; draft kept");
                match e {
                    TrailError::Submit(_) => Err(e),
                    other => Err(TrailError::Submit(other.to_string())),
                }
            }
        }
    }

    /// Throw the draft away
    pub async fn cancel(&mut self) -> Result<StopOutcome> {
        self.ensure(SessionStatus::Stopping, "cancel")?;
        tracing::info!("Draft discarded");
        self.finish().await;
        self.publish();
        Ok(StopOutcome::Discarded(DiscardReason::Cancelled))
    }

    fn ensure(&self, expected: SessionStatus, action: &'static str) -> Result<()> {
        if self.status != expected {
            return Err(TrailError::InvalidState {
                action,
                state: self.status.to_string(),
            });
        }
        Ok(())
    }

    async fn request_foreground_permission(&self) -> Result<()> {
        let wait = self.options.permission_timeout;
        match timeout(wait, self.provider.request_foreground_permission()).await {
            Ok(Ok(PermissionStatus::Granted)) => Ok(()),
            Ok(Ok(PermissionStatus::Denied)) => {
                Err(TrailError::PermissionDenied(PermissionScope::Foreground))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TrailError::Timeout("foreground location permission", wait)),
        }
    }

    /// Work out whether background delivery can be used; every refusal degrades to a notice
    async fn prepare_background(&self) -> Option<Arc<dyn BackgroundUpdates>> {
        if !self.options.enable_background {
            tracing::info!("Background tracking disabled by configuration");
            return None;
        }
        let Some(background) = self.provider.background_updates() else {
            tracing::warn!(provider = self.provider.name(), "Background tracking not supported; foreground only");
            self.push_notice(Notice::BackgroundUnavailable);
            return None;
        };

        let wait = self.options.permission_timeout;
        match timeout(wait, self.provider.request_background_permission()).await {
            Ok(Ok(PermissionStatus::Granted)) => Some(background),
            Ok(Ok(PermissionStatus::Denied)) => {
                self.push_notice(Notice::BackgroundPermissionDenied);
                None
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Background permission request failed");
                self.push_notice(Notice::BackgroundPermissionDenied);
                None
            }
            Err(_) => {
                tracing::warn!("Background permission request timed out");
                self.push_notice(Notice::BackgroundPermissionDenied);
                None
            }
        }
    }

    /// One-shot fix so the track has a starting point before the first watch update.
    /// The point is durable by the time this returns.
    async fn seed_position(&self, writer: &TrackWriter) {
        let wait = self.options.position_timeout;
        match timeout(wait, self.provider.current_position(self.options.watch.accuracy)).await {
            Ok(Ok(sample)) => {
                let appended = self.session.write().accept_sample(&sample, Utc::now());
                if appended {
                    writer.append(sample, SampleOrigin::Seed).await;
                    writer.flush().await;
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "No initial position");
                self.push_notice(Notice::AcquiringLocation);
            }
            Err(_) => {
                tracing::warn!(after = ?wait, "Initial position timed out");
                self.push_notice(Notice::AcquiringLocation);
            }
        }
    }

    async fn activate(
        &mut self,
        writer: TrackWriter,
        writer_task: JoinHandle<()>,
        background: Option<Arc<dyn BackgroundUpdates>>,
        foreground: bool,
    ) {
        if foreground {
            match self.provider.watch_position(self.options.watch.clone()).await {
                Ok(watch) => {
                    self.watcher = Some(ForegroundWatcher::spawn(
                        watch,
                        self.session.clone(),
                        writer.clone(),
                    ));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Foreground location watch failed");
                    self.push_notice(Notice::ForegroundUnavailable(e.to_string()));
                }
            }
        }

        self.mode = TrackingMode::ForegroundOnly;
        if let Some(background) = background {
            if background.is_registered(BACKGROUND_TASK_NAME).await {
                tracing::info!("Replacing stale background registration");
                if let Err(e) = background.deregister(BACKGROUND_TASK_NAME).await {
                    tracing::warn!(error = %e, "Could not remove stale background registration");
                }
            }

            let handler: Arc<dyn BackgroundHandler> =
                Arc::new(BackgroundCollector::new(writer.clone()));
            let options = BackgroundOptions {
                watch: self.options.watch.clone(),
                notification: self.options.notification.clone(),
            };
            match background.register(BACKGROUND_TASK_NAME, options, handler).await {
                Ok(()) => {
                    self.mode = TrackingMode::Full;
                    self.background = Some(background);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Background registration failed");
                    self.push_notice(Notice::BackgroundRegistrationFailed(e.to_string()));
                }
            }
        }

        self.writer = Some((writer, writer_task));
        self.ticker = Some(self.spawn_ticker());
    }

    fn spawn_ticker(&self) -> JoinHandle<()> {
        let session = self.session.clone();
        let notices = self.notices.clone();
        let stats = self.stats.clone();
        let mode = self.mode;
        let stall_after = self.options.stall_after;
        let period = self.options.tick_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut was_stalled = false;
            loop {
                interval.tick().await;
                let snapshot = session.read().live_stats(
                    SessionStatus::Recording,
                    mode,
                    &notices.read(),
                    stall_after,
                    Utc::now(),
                );
                if snapshot.stalled && !was_stalled {
                    tracing::warn!(age = ?snapshot.last_update_age_secs, "No location updates received");
                }
                was_stalled = snapshot.stalled;
                stats.send_replace(snapshot);
            }
        })
    }

    /// Stop every producer and wait until the durable track is final
    async fn teardown(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.stop().await;
        }

        if let Some(background) = self.background.take() {
            if let Err(e) = background.deregister(BACKGROUND_TASK_NAME).await {
                tracing::error!(error = %e, "Background tracking could not be stopped");
                self.push_notice(Notice::BackgroundLeak(e.to_string()));
            }
        }

        if let Some((writer, task)) = self.writer.take() {
            writer.shutdown().await;
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Track writer ended abnormally");
            }
        }

        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }

    /// Clear durable and in-memory state and return to Idle
    async fn finish(&mut self) {
        if let Err(e) = self.store.clear_all().await {
            tracing::warn!(error = %e, "Could not clear recording state");
        }
        self.session.write().reset();
        self.notices.write().clear();
        self.draft = None;
        self.mode = TrackingMode::ForegroundOnly;
        self.status = SessionStatus::Idle;
    }

    fn push_notice(&self, notice: Notice) {
        let mut notices = self.notices.write();
        if !notices.contains(&notice) {
            notices.push(notice);
        }
    }

    fn publish(&self) {
        self.stats.send_replace(self.live_stats());
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}
