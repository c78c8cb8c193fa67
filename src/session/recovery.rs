// src/session/recovery.rs
//! Picks up a recording that outlived the process that started it

use super::controller::SessionController;
use super::state::SessionStatus;
use crate::error::Result;
use crate::store::{DurableRecordingStore, PersistedSession};
use chrono::Utc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    NothingToRecover,
    /// Controller is back in Recording with the persisted track
    Resumed { points: usize, elapsed_secs: u64 },
    /// Controller was already busy; the store was left alone
    AlreadyActive,
}

pub struct RecoveryReconciler {
    store: DurableRecordingStore,
}

impl RecoveryReconciler {
    pub fn new(store: DurableRecordingStore) -> Self {
        Self { store }
    }

    /// Snapshot of an in-progress session, if the store holds one
    pub async fn detect(&self) -> Option<PersistedSession> {
        let snapshot = self.store.load_snapshot().await;
        snapshot.is_in_progress().then_some(snapshot)
    }

    /// Resume a persisted session into an idle controller
    pub async fn reconcile(&self, controller: &mut SessionController) -> Result<RecoveryOutcome> {
        if controller.status() != SessionStatus::Idle {
            return Ok(RecoveryOutcome::AlreadyActive);
        }

        let snapshot = self.store.load_snapshot().await;
        if !snapshot.is_in_progress() {
            if snapshot.is_partial() {
                // Half a session can never be resumed; drop it so it cannot resurface
                tracing::warn!(
                    has_start = snapshot.started_at.is_some(),
                    points = snapshot.point_count(),
                    "Clearing incomplete recording state"
                );
                if let Err(e) = self.store.clear_all().await {
                    tracing::warn!(error = %e, "Could not clear incomplete recording state");
                }
            }
            return Ok(RecoveryOutcome::NothingToRecover);
        }

        let points = snapshot.point_count();
        let elapsed_secs = snapshot
            .started_at
            .map(|start| Utc::now().signed_duration_since(start).num_seconds().max(0) as u64)
            .unwrap_or(0);

        tracing::info!(points, elapsed_secs, "Recovering recording in progress");
        controller.resume(snapshot).await?;
        Ok(RecoveryOutcome::Resumed { points, elapsed_secs })
    }
}
