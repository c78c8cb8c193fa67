// tests/session_lifecycle.rs
//! Start / stop / submit / cancel behavior of the session controller

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{controller, memory_store, wait_for_durable, wait_for_points, MockBackground, MockProvider, MockTrailApi};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use trail_recorder::error::PermissionScope;
use trail_recorder::gps::provider::PermissionStatus;
use trail_recorder::metrics;
use trail_recorder::session::{
    DiscardReason, Notice, SessionStatus, StopOutcome, TrackingMode, TrailMetadata,
};
use trail_recorder::store::KeyValueStore;
use trail_recorder::{Coordinate, LocationSample, TrailError};

fn fix(lat: f64, lon: f64, secs_from_now: i64) -> LocationSample {
    LocationSample::new(lat, lon).with_timestamp(Utc::now() + ChronoDuration::seconds(secs_from_now))
}

#[tokio::test]
async fn test_start_clears_residue_and_seeds_first_point() {
    let (memory, store) = memory_store();
    store.save_started_at(Utc::now() - ChronoDuration::hours(3)).await;
    store
        .save_track(&[Coordinate::new(5.0, 5.0), Coordinate::new(5.0, 5.1), Coordinate::new(5.0, 5.2)])
        .await;
    store.save_max_speed(50.0).await;
    store.save_max_elevation(900.0).await;

    let (provider, _feed) = MockProvider::new(Some(LocationSample::new(0.0, 0.0)));
    let mut controller = controller(store.clone(), provider, Arc::new(MockTrailApi::default()));

    let before = Utc::now();
    controller.start().await.unwrap();

    // Seeded point is already durable when start returns
    assert_eq!(controller.status(), SessionStatus::Recording);
    assert_eq!(store.load_track().await, Some(vec![Coordinate::new(0.0, 0.0)]));
    assert!(store.load_snapshot().await.is_in_progress());
    assert_eq!(store.load_max_speed().await, None);
    assert_eq!(store.load_max_elevation().await, None);
    let started = store.load_started_at().await.unwrap();
    assert!(started >= before - ChronoDuration::milliseconds(1));
    assert!(memory.get("recording.last_update").await.unwrap().is_some());

    let stats = controller.live_stats();
    assert_eq!(stats.points, 1);
    assert_eq!(stats.current_location, Some(Coordinate::new(0.0, 0.0)));
}

#[tokio::test]
async fn test_stop_with_single_point_discards_and_clears() {
    let (memory, store) = memory_store();
    let (provider, _feed) = MockProvider::new(Some(LocationSample::new(0.0, 0.0)));
    let mut controller = controller(store.clone(), provider, Arc::new(MockTrailApi::default()));

    controller.start().await.unwrap();
    let outcome = controller.stop().await.unwrap();

    assert_eq!(outcome, StopOutcome::Discarded(DiscardReason::InsufficientData));
    assert_eq!(controller.status(), SessionStatus::Idle);
    assert!(controller.draft().is_none());
    assert!(controller.notices().contains(&Notice::InsufficientData));
    assert!(memory.is_empty());
}

#[tokio::test]
async fn test_stop_with_two_points_produces_matching_draft() {
    let (_, store) = memory_store();
    let (provider, feed) = MockProvider::new(Some(LocationSample::new(0.0, 0.0)));
    let mut controller = controller(store.clone(), provider, Arc::new(MockTrailApi::default()));

    controller.start().await.unwrap();
    feed.send(fix(0.0, 0.01, 1).with_speed(2.5).with_altitude(40.0)).await.unwrap();
    wait_for_points(&controller, 2).await;

    let draft = match controller.stop().await.unwrap() {
        StopOutcome::Draft(draft) => draft,
        other => panic!("expected a draft, got {:?}", other),
    };

    assert_eq!(controller.status(), SessionStatus::Stopping);
    assert_eq!(draft.track, vec![Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 0.01)]);
    assert!((draft.distance_m - metrics::total_distance_meters(&draft.track)).abs() < 1e-9);
    assert!((draft.distance_m - 1111.95).abs() < 0.1);
    assert_eq!(draft.pace, metrics::pace_min_per_km(draft.distance_m, draft.duration_secs as f64));
    assert!((draft.max_speed_kmh - 9.0).abs() < 1e-9);
    assert_eq!(draft.max_elevation_m, 40.0);
    assert_eq!(controller.draft(), Some(&draft));

    // Durable state survives until the draft is saved or cancelled
    assert_eq!(store.load_track().await.map(|t| t.len()), Some(2));
}

#[tokio::test]
async fn test_submit_failure_keeps_draft_then_retry_succeeds() {
    let (memory, store) = memory_store();
    let (provider, feed) = MockProvider::new(Some(LocationSample::new(0.0, 0.0)));
    let api = Arc::new(MockTrailApi::default());
    let mut controller = controller(store.clone(), provider, api.clone());

    controller.start().await.unwrap();
    feed.send(fix(0.0, 0.01, 1)).await.unwrap();
    wait_for_points(&controller, 2).await;
    controller.stop().await.unwrap();

    api.fail.store(true, Ordering::SeqCst);
    let metadata = TrailMetadata {
        name: Some("Harbour walk".to_string()),
        tags: vec!["coast".to_string()],
        ..Default::default()
    };
    let err = controller.submit(metadata.clone()).await.unwrap_err();
    assert!(matches!(err, TrailError::Submit(_)));
    assert!(err.is_retryable());
    assert_eq!(controller.status(), SessionStatus::Stopping);
    assert!(controller.draft().is_some());
    assert!(!memory.is_empty());

    api.fail.store(false, Ordering::SeqCst);
    let record = controller.submit(TrailMetadata::default()).await.unwrap();

    assert_eq!(record.name.as_deref(), Some("Harbour walk"));
    assert_eq!(controller.status(), SessionStatus::Idle);
    assert!(controller.draft().is_none());
    assert!(memory.is_empty());

    let submissions = api.submissions.lock();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].tags, vec!["coast".to_string()]);
    assert_eq!(submissions[0].path.len(), 2);
}

#[tokio::test]
async fn test_cancel_clears_everything() {
    let (memory, store) = memory_store();
    let (provider, feed) = MockProvider::new(Some(LocationSample::new(0.0, 0.0)));
    let api = Arc::new(MockTrailApi::default());
    let mut controller = controller(store, provider, api.clone());

    controller.start().await.unwrap();
    feed.send(fix(0.0, 0.002, 1)).await.unwrap();
    wait_for_points(&controller, 2).await;
    controller.stop().await.unwrap();
    let outcome = controller.cancel().await.unwrap();

    assert_eq!(outcome, StopOutcome::Discarded(DiscardReason::Cancelled));
    assert_eq!(controller.status(), SessionStatus::Idle);
    assert!(controller.draft().is_none());
    assert!(memory.is_empty());
    assert!(api.submissions.lock().is_empty());
}

#[tokio::test]
async fn test_background_unsupported_degrades_to_foreground_only() {
    let (_, store) = memory_store();
    let (provider, _feed) = MockProvider::new(Some(LocationSample::new(0.0, 0.0)));
    let mut controller = controller(store, provider, Arc::new(MockTrailApi::default()));

    controller.start().await.unwrap();

    assert_eq!(controller.status(), SessionStatus::Recording);
    assert_eq!(controller.tracking_mode(), TrackingMode::ForegroundOnly);
    assert!(controller.notices().contains(&Notice::BackgroundUnavailable));
}

#[tokio::test]
async fn test_background_permission_denied_degrades() {
    let (_, store) = memory_store();
    let background = Arc::new(MockBackground::default());
    let (mut provider, _feed) = MockProvider::new(Some(LocationSample::new(0.0, 0.0)));
    provider.background_permission = PermissionStatus::Denied;
    let provider = provider.with_background(background.clone());
    let mut controller = controller(store, provider, Arc::new(MockTrailApi::default()));

    controller.start().await.unwrap();

    assert_eq!(controller.tracking_mode(), TrackingMode::ForegroundOnly);
    assert!(controller.notices().contains(&Notice::BackgroundPermissionDenied));
    assert_eq!(background.registrations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_foreground_denied_fails_and_stays_idle() {
    let (memory, store) = memory_store();
    let (mut provider, _feed) = MockProvider::new(Some(LocationSample::new(0.0, 0.0)));
    provider.foreground = PermissionStatus::Denied;
    let mut controller = controller(store, provider, Arc::new(MockTrailApi::default()));

    let err = controller.start().await.unwrap_err();

    assert!(matches!(err, TrailError::PermissionDenied(PermissionScope::Foreground)));
    assert_eq!(controller.status(), SessionStatus::Idle);
    assert!(memory.is_empty());
}

#[tokio::test]
async fn test_permission_prompt_timeout() {
    let (_, store) = memory_store();
    let (mut provider, _feed) = MockProvider::new(None);
    provider.permission_delay = Some(Duration::from_secs(5));
    let mut controller = controller(store, provider, Arc::new(MockTrailApi::default()));

    let err = controller.start().await.unwrap_err();

    assert!(matches!(err, TrailError::Timeout(..)));
    assert_eq!(controller.status(), SessionStatus::Idle);
}

#[tokio::test]
async fn test_missing_initial_fix_is_a_notice() {
    let (_, store) = memory_store();
    let (provider, feed) = MockProvider::new(None);
    let mut controller = controller(store, provider, Arc::new(MockTrailApi::default()));

    controller.start().await.unwrap();
    assert!(controller.notices().contains(&Notice::AcquiringLocation));
    assert_eq!(controller.live_stats().points, 0);

    feed.send(fix(1.0, 1.0, 0)).await.unwrap();
    wait_for_points(&controller, 1).await;
    assert_eq!(controller.status(), SessionStatus::Recording);
}

#[tokio::test]
async fn test_background_batches_join_the_durable_track() {
    let (_, store) = memory_store();
    let background = Arc::new(MockBackground::default());
    let (provider, feed) = MockProvider::new(Some(LocationSample::new(0.0, 0.0)));
    let provider = provider.with_background(background.clone());
    let mut controller = controller(store.clone(), provider, Arc::new(MockTrailApi::default()));

    controller.start().await.unwrap();
    assert_eq!(controller.tracking_mode(), TrackingMode::Full);
    let options = background.last_options.lock().clone().unwrap();
    assert_eq!(options.notification.title, "Recording trail");

    // Foreground sees one fix; the background delivers it again plus two the foreground missed
    let shared = fix(0.0, 0.001, 1);
    feed.send(shared.clone()).await.unwrap();
    wait_for_points(&controller, 2).await;
    wait_for_durable(&store, 2).await;
    assert!(background
        .deliver(vec![shared, fix(0.0, 0.002, 2), fix(0.0, 0.003, 3)])
        .await);

    let draft = match controller.stop().await.unwrap() {
        StopOutcome::Draft(draft) => draft,
        other => panic!("expected a draft, got {:?}", other),
    };

    assert_eq!(draft.track.len(), 4);
    assert_eq!(draft.track[3], Coordinate::new(0.0, 0.003));
    assert!(!background.deliver(vec![fix(0.0, 0.004, 4)]).await);
}

#[tokio::test]
async fn test_background_registration_failure_is_a_notice() {
    let (_, store) = memory_store();
    let background = Arc::new(MockBackground::default());
    background.fail_register.store(true, Ordering::SeqCst);
    let (provider, _feed) = MockProvider::new(Some(LocationSample::new(0.0, 0.0)));
    let provider = provider.with_background(background);
    let mut controller = controller(store, provider, Arc::new(MockTrailApi::default()));

    controller.start().await.unwrap();

    assert_eq!(controller.tracking_mode(), TrackingMode::ForegroundOnly);
    assert!(controller
        .notices()
        .iter()
        .any(|n| matches!(n, Notice::BackgroundRegistrationFailed(_))));
}

#[tokio::test]
async fn test_deregister_failure_reported_but_stop_completes() {
    let (_, store) = memory_store();
    let background = Arc::new(MockBackground::default());
    let (provider, feed) = MockProvider::new(Some(LocationSample::new(0.0, 0.0)));
    let provider = provider.with_background(background.clone());
    let mut controller = controller(store, provider, Arc::new(MockTrailApi::default()));

    controller.start().await.unwrap();
    feed.send(fix(0.0, 0.001, 1)).await.unwrap();
    wait_for_points(&controller, 2).await;
    background.fail_deregister.store(true, Ordering::SeqCst);

    let outcome = controller.stop().await.unwrap();

    assert!(matches!(outcome, StopOutcome::Draft(_)));
    assert!(controller
        .notices()
        .iter()
        .any(|n| matches!(n, Notice::BackgroundLeak(_))));
    // The collector's writer is gone; late batches never reach the store
    background.deliver(vec![fix(0.0, 0.009, 9)]).await;
    assert_eq!(controller.draft().map(|d| d.track.len()), Some(2));
}

#[tokio::test]
async fn test_live_stats_are_published() {
    let (_, store) = memory_store();
    let (provider, feed) = MockProvider::new(Some(LocationSample::new(0.0, 0.0)));
    let mut controller = controller(store, provider, Arc::new(MockTrailApi::default()));
    let mut stats = controller.subscribe();

    controller.start().await.unwrap();
    feed.send(fix(0.0, 0.01, 1)).await.unwrap();
    wait_for_points(&controller, 2).await;

    let published = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            stats.changed().await.unwrap();
            let snapshot = stats.borrow_and_update().clone();
            if snapshot.points == 2 {
                return snapshot;
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(published.status, SessionStatus::Recording);
    assert!(published.distance_m > 1000.0);
}

#[tokio::test]
async fn test_operations_in_wrong_state_rejected() {
    let (_, store) = memory_store();
    let (provider, _feed) = MockProvider::new(Some(LocationSample::new(0.0, 0.0)));
    let mut controller = controller(store, provider, Arc::new(MockTrailApi::default()));

    controller.start().await.unwrap();
    assert!(matches!(
        controller.start().await,
        Err(TrailError::InvalidState { action: "start", .. })
    ));
    assert!(controller.cancel().await.is_err());
    assert!(controller.submit(TrailMetadata::default()).await.is_err());
}
