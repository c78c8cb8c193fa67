// src/recorder.rs
//! Wires configuration to a controller and runs one recording end to end

use crate::{
    api::{ArchiveTrailApi, HttpTrailApi, TrailApi},
    config::RecorderConfig,
    display::terminal::{self, TerminalDisplay},
    error::{Result, TrailError},
    export::{self, TrackFormat},
    gps::{provider::LocationProvider, source::LocationSource},
    session::{
        ControllerOptions, DraftTrail, LiveStats, Notice, RecoveryOutcome, RecoveryReconciler,
        SessionController, StopOutcome, TrailMetadata, TrailRecord,
    },
    store::{DurableRecordingStore, FileStore, PersistedSession},
};
use chrono::Utc;
use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::watch;

/// How a recording run ended
#[derive(Debug)]
pub enum RunOutcome {
    Saved(TrailRecord),
    Discarded,
    /// Upload failed; the trail is kept in the store for `upload`
    Pending(TrailError),
}

/// How `record` got a session going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingStart {
    Fresh,
    /// An interrupted recording was found and picked up instead of being replaced
    Continued { points: usize, elapsed_secs: u64 },
}

pub struct Recorder {
    config: RecorderConfig,
    store: DurableRecordingStore,
    archive: ArchiveTrailApi,
    controller: SessionController,
    dashboard: bool,
}

impl Recorder {
    /// Build source, store and backend from configuration
    pub fn from_config(config: RecorderConfig, dashboard: bool) -> Result<Self> {
        let provider = LocationSource::from_config(&config)?.into_provider();
        let store = open_store(&config)?;
        let api = open_api(&config)?;

        Ok(Self::with_parts(config, store, provider, api, dashboard))
    }

    pub fn with_parts(
        config: RecorderConfig,
        store: DurableRecordingStore,
        provider: Arc<dyn LocationProvider>,
        api: Arc<dyn TrailApi>,
        dashboard: bool,
    ) -> Self {
        let archive = config
            .resolved_archive_dir()
            .map(ArchiveTrailApi::new)
            .unwrap_or_else(|_| ArchiveTrailApi::new("trails"));
        let controller = SessionController::new(
            ControllerOptions::from_config(&config),
            store.clone(),
            provider,
            api,
        );

        Self {
            config,
            store,
            archive,
            controller,
            dashboard,
        }
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    /// Record until Ctrl+C, continuing an interrupted recording if the store holds one
    pub async fn record(&mut self, metadata: TrailMetadata) -> Result<RunOutcome> {
        if let Some(pending) = self.store.load_pending_upload().await {
            println!(
                "Trail {} is still waiting for upload; run `trail-recorder upload` to send it.",
                pending.name.as_deref().unwrap_or("unnamed")
            );
        }

        if let RecordingStart::Continued { points, elapsed_secs } = self.start_or_continue().await? {
            println!(
                "Continuing the unfinished recording ({} points, started {} ago). Run `trail-recorder discard` first to start over.",
                points,
                crate::metrics::format_duration(elapsed_secs)
            );
        }
        self.run_until_interrupt(metadata).await
    }

    /// Resume whatever the store holds; start a new session only when there is nothing to keep
    pub async fn start_or_continue(&mut self) -> Result<RecordingStart> {
        let reconciler = RecoveryReconciler::new(self.store.clone());
        match reconciler.reconcile(&mut self.controller).await? {
            RecoveryOutcome::Resumed { points, elapsed_secs } => {
                tracing::info!(points, elapsed_secs, "Continuing interrupted recording");
                Ok(RecordingStart::Continued { points, elapsed_secs })
            }
            RecoveryOutcome::NothingToRecover | RecoveryOutcome::AlreadyActive => {
                self.controller.start().await?;
                Ok(RecordingStart::Fresh)
            }
        }
    }

    /// Continue an interrupted recording and run it until Ctrl+C
    pub async fn resume(&mut self, metadata: TrailMetadata) -> Result<Option<RunOutcome>> {
        let reconciler = RecoveryReconciler::new(self.store.clone());
        match reconciler.reconcile(&mut self.controller).await? {
            RecoveryOutcome::NothingToRecover => {
                tracing::info!("No unfinished recording found");
                Ok(None)
            }
            RecoveryOutcome::AlreadyActive => Ok(None),
            RecoveryOutcome::Resumed { points, elapsed_secs } => {
                tracing::info!(points, elapsed_secs, "Resumed recording");
                self.run_until_interrupt(metadata).await.map(Some)
            }
        }
    }

    async fn run_until_interrupt(&mut self, metadata: TrailMetadata) -> Result<RunOutcome> {
        let running = Arc::new(AtomicBool::new(true));

        let stats = self.controller.subscribe();
        let (dashboard, notices) = if self.dashboard {
            let running = Arc::clone(&running);
            let task = tokio::spawn(async move { TerminalDisplay::default().run(stats, running).await });
            (Some(task), None)
        } else {
            (None, Some(tokio::spawn(announce_notices(stats))))
        };

        tokio::signal::ctrl_c().await?;
        running.store(false, Ordering::Relaxed);
        if let Some(notices) = notices {
            notices.abort();
        }
        if let Some(dashboard) = dashboard {
            match dashboard.await {
                Ok(Err(e)) => tracing::warn!(error = %e, "Dashboard failed"),
                Err(e) => tracing::warn!(error = %e, "Dashboard task panicked"),
                Ok(Ok(())) => {}
            }
        }

        self.finish(metadata).await
    }

    /// Stop the controller and save the result, retrying the upload before giving up
    pub async fn finish(&mut self, metadata: TrailMetadata) -> Result<RunOutcome> {
        let draft = match self.controller.stop().await? {
            StopOutcome::Discarded(reason) => {
                tracing::info!(?reason, "Recording discarded");
                return Ok(RunOutcome::Discarded);
            }
            StopOutcome::Draft(draft) => draft,
        };
        print_summary(&draft);

        let attempts = self.config.submit_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.controller.submit(metadata.clone()).await {
                Ok(record) => return Ok(RunOutcome::Saved(record)),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    tracing::warn!(attempt, error = %e, "Save failed, retrying");
                    tokio::time::sleep(Duration::from_secs(2 * attempt as u64)).await;
                }
                Err(e) => {
                    last_error = Some(e);
                    break;
                }
            }
        }

        let error = last_error.unwrap_or_else(|| TrailError::Submit("no attempts made".to_string()));
        let Some(submission) = self.controller.draft().map(DraftTrail::to_submission) else {
            return Ok(RunOutcome::Pending(error));
        };

        // The exact draft goes to the pending slot; only then is the session released
        match self.store.save_pending_upload(&submission).await {
            Ok(()) => {
                self.controller.cancel().await?;
                tracing::info!(id = %submission.id, "Trail kept for a later upload");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not keep the trail for upload; the recording stays in the store");
            }
        }

        if self.config.backend_url.is_some() {
            match self.archive.create_trail(&submission).await {
                Ok(_) => tracing::info!(id = %submission.id, "Kept a local copy of the unsaved trail"),
                Err(e) => tracing::warn!(error = %e, "Could not archive unsaved trail"),
            }
        }
        Ok(RunOutcome::Pending(error))
    }
}

fn open_api(config: &RecorderConfig) -> Result<Arc<dyn TrailApi>> {
    Ok(match config.backend_url {
        Some(ref url) => Arc::new(HttpTrailApi::new(url.clone(), config.backend_token.clone())?),
        None => Arc::new(ArchiveTrailApi::new(config.resolved_archive_dir()?)),
    })
}

/// Notices that have not been shown yet, remembering them as shown
pub fn fresh_notices(seen: &mut Vec<Notice>, current: &[Notice]) -> Vec<Notice> {
    let fresh: Vec<Notice> = current.iter().filter(|n| !seen.contains(n)).cloned().collect();
    seen.extend(fresh.iter().cloned());
    fresh
}

/// Without a dashboard, notices are printed as they appear
async fn announce_notices(mut stats: watch::Receiver<LiveStats>) {
    let mut seen = Vec::new();
    loop {
        let current = stats.borrow_and_update().notices.clone();
        for notice in fresh_notices(&mut seen, &current) {
            tracing::debug!(%notice, "Recording notice");
            println!("Notice: {}", notice);
        }
        if stats.changed().await.is_err() {
            break;
        }
    }
}

/// Send the trail kept by a failed upload, then forget it
pub async fn upload_pending(config: &RecorderConfig) -> Result<Option<RunOutcome>> {
    let store = open_store(config)?;
    let api = open_api(config)?;
    upload_pending_with(&store, api.as_ref(), config.submit_attempts).await
}

pub async fn upload_pending_with(
    store: &DurableRecordingStore,
    api: &dyn TrailApi,
    attempts: u32,
) -> Result<Option<RunOutcome>> {
    let Some(submission) = store.load_pending_upload().await else {
        return Ok(None);
    };

    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        match api.create_trail(&submission).await {
            Ok(record) => {
                store.clear_pending_upload().await?;
                tracing::info!(id = %record.id, "Pending trail uploaded");
                return Ok(Some(RunOutcome::Saved(record)));
            }
            Err(e) if e.is_retryable() && attempt < attempts => {
                tracing::warn!(attempt, error = %e, "Upload failed, retrying");
                tokio::time::sleep(Duration::from_secs(2 * attempt as u64)).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Upload failed; trail kept");
                return Ok(Some(RunOutcome::Pending(e)));
            }
        }
    }
    Ok(None)
}

fn open_store(config: &RecorderConfig) -> Result<DurableRecordingStore> {
    let path = config.resolved_store_path()?;
    tracing::debug!(path = %path.display(), "Using recording store");
    Ok(DurableRecordingStore::new(Arc::new(FileStore::new(path))))
}

fn print_summary(draft: &DraftTrail) {
    println!("Distance:  {}", crate::metrics::format_distance(draft.distance_m));
    println!("Duration:  {}", crate::metrics::format_duration(draft.duration_secs));
    println!("Pace:      {} min/km", draft.pace);
    println!("Points:    {}", draft.track.len());
}

/// Draft built from whatever the store currently holds, for inspection or export
pub fn snapshot_draft(snapshot: &PersistedSession) -> Option<DraftTrail> {
    if !snapshot.is_in_progress() {
        return None;
    }
    let started_at = snapshot.started_at?;
    let track = snapshot.track.clone()?;
    Some(DraftTrail::from_final_track(
        started_at,
        snapshot.last_update_at.unwrap_or_else(Utc::now),
        track,
        snapshot.max_speed_kmh.unwrap_or(0.0),
        snapshot.max_elevation_m.unwrap_or(0.0),
    ))
}

/// Print what the store holds about an unfinished recording
pub async fn print_status(config: &RecorderConfig) -> Result<()> {
    let store = open_store(config)?;
    if let Some(pending) = store.load_pending_upload().await {
        println!(
            "Trail {} ({}) is waiting for upload",
            pending.name.as_deref().unwrap_or("unnamed"),
            crate::metrics::format_distance(pending.distance)
        );
    }
    let snapshot = store.load_snapshot().await;

    match snapshot_draft(&snapshot) {
        Some(draft) => {
            println!("Unfinished recording started {}", draft.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
            let stats = crate::session::LiveStats {
                status: crate::session::SessionStatus::Recording,
                elapsed_secs: Utc::now()
                    .signed_duration_since(draft.started_at)
                    .num_seconds()
                    .max(0) as u64,
                distance_m: draft.distance_m,
                pace: draft.pace.clone(),
                max_speed_kmh: draft.max_speed_kmh,
                max_elevation_m: draft.max_elevation_m,
                points: draft.track.len(),
                current_location: draft.track.last().copied(),
                ..crate::session::LiveStats::idle()
            };
            for line in terminal::summary_lines(&stats) {
                println!("  {}", line);
            }
        }
        None if snapshot.is_partial() => println!("Store holds an incomplete recording; `resume` will clear it"),
        None => println!("No unfinished recording"),
    }
    Ok(())
}

/// Drop an unfinished recording without saving it
pub async fn discard(config: &RecorderConfig) -> Result<bool> {
    let store = open_store(config)?;
    let had_session = store.load_snapshot().await.is_in_progress();
    store.clear_all().await?;
    Ok(had_session)
}

/// Write the unfinished recording's track to a file
pub async fn export_unfinished(config: &RecorderConfig, path: &Path, format: TrackFormat) -> Result<()> {
    let store = open_store(config)?;
    let snapshot = store.load_snapshot().await;
    let draft = snapshot_draft(&snapshot)
        .ok_or_else(|| TrailError::Other("No unfinished recording to export".to_string()))?;
    export::export_to_file(&draft, path, format).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gps::data::Coordinate;

    #[test]
    fn test_snapshot_draft_requires_in_progress() {
        assert!(snapshot_draft(&PersistedSession::default()).is_none());

        let start = Utc::now() - chrono::Duration::seconds(120);
        let snapshot = PersistedSession {
            started_at: Some(start),
            track: Some(vec![Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 0.01)]),
            last_update_at: Some(start + chrono::Duration::seconds(100)),
            ..Default::default()
        };
        let draft = snapshot_draft(&snapshot).unwrap();
        assert_eq!(draft.duration_secs, 100);
        assert_eq!(draft.track.len(), 2);
    }

    #[test]
    fn test_fresh_notices_reported_once() {
        let mut seen = Vec::new();
        let first = fresh_notices(&mut seen, &[Notice::BackgroundUnavailable]);
        assert_eq!(first, vec![Notice::BackgroundUnavailable]);

        let second = fresh_notices(
            &mut seen,
            &[Notice::BackgroundUnavailable, Notice::AcquiringLocation],
        );
        assert_eq!(second, vec![Notice::AcquiringLocation]);
        assert!(fresh_notices(&mut seen, &[Notice::AcquiringLocation]).is_empty());
    }

    #[tokio::test]
    async fn test_discard_and_export_with_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RecorderConfig::default();
        config.store_path = Some(dir.path().join("recording.json"));

        let store = open_store(&config).unwrap();
        store.save_started_at(Utc::now()).await;
        store
            .save_track(&[Coordinate::new(1.0, 1.0), Coordinate::new(1.0, 1.001)])
            .await;

        let out = dir.path().join("partial.geojson");
        export_unfinished(&config, &out, TrackFormat::GeoJson).await.unwrap();
        assert!(out.exists());

        assert!(discard(&config).await.unwrap());
        assert!(!discard(&config).await.unwrap());
        assert!(export_unfinished(&config, &out, TrackFormat::Gpx).await.is_err());
    }
}
