// tests/common/mod.rs
//! Scripted location source, backend and store helpers shared by the integration tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use trail_recorder::api::TrailApi;
use trail_recorder::gps::provider::{
    Accuracy, BackgroundHandler, BackgroundOptions, BackgroundUpdates, LocationProvider,
    LocationWatch, PermissionStatus, WatchOptions,
};
use trail_recorder::session::{ControllerOptions, SessionController, TrailRecord, TrailSubmission};
use trail_recorder::store::{DurableRecordingStore, MemoryStore};
use trail_recorder::{LocationSample, Result, TrailError};

/// Background delivery the test drives by hand
#[derive(Default)]
pub struct MockBackground {
    handler: Mutex<Option<Arc<dyn BackgroundHandler>>>,
    pub last_options: Mutex<Option<BackgroundOptions>>,
    pub fail_register: AtomicBool,
    pub fail_deregister: AtomicBool,
    pub registrations: AtomicUsize,
}

impl MockBackground {
    /// Hand a batch to the registered collector, as the platform would
    #[allow(dead_code)]
    pub async fn deliver(&self, samples: Vec<LocationSample>) -> bool {
        let handler = self.handler.lock().clone();
        match handler {
            Some(handler) => {
                handler.on_locations(samples).await;
                true
            }
            None => false,
        }
    }

    #[allow(dead_code)]
    pub async fn deliver_error(&self, error: TrailError) {
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler.on_error(error).await;
        }
    }
}

#[async_trait]
impl BackgroundUpdates for MockBackground {
    async fn register(
        &self,
        _task_name: &str,
        options: BackgroundOptions,
        handler: Arc<dyn BackgroundHandler>,
    ) -> Result<()> {
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(TrailError::Other("registration refused".to_string()));
        }
        *self.handler.lock() = Some(handler);
        *self.last_options.lock() = Some(options);
        self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn deregister(&self, _task_name: &str) -> Result<()> {
        if self.fail_deregister.load(Ordering::SeqCst) {
            return Err(TrailError::Other("still running".to_string()));
        }
        *self.handler.lock() = None;
        Ok(())
    }

    async fn is_registered(&self, _task_name: &str) -> bool {
        self.handler.lock().is_some()
    }
}

/// Location source with scripted permissions, initial fix and foreground stream
pub struct MockProvider {
    pub foreground: PermissionStatus,
    pub background_permission: PermissionStatus,
    pub initial: Option<LocationSample>,
    pub permission_delay: Option<Duration>,
    pub background: Option<Arc<MockBackground>>,
    feed: Mutex<Option<mpsc::Receiver<LocationSample>>>,
}

impl MockProvider {
    /// Granted everywhere, no background support; returns the foreground feed
    pub fn new(initial: Option<LocationSample>) -> (Self, mpsc::Sender<LocationSample>) {
        let (tx, rx) = mpsc::channel(64);
        let provider = Self {
            foreground: PermissionStatus::Granted,
            background_permission: PermissionStatus::Granted,
            initial,
            permission_delay: None,
            background: None,
            feed: Mutex::new(Some(rx)),
        };
        (provider, tx)
    }

    #[allow(dead_code)]
    pub fn with_background(mut self, background: Arc<MockBackground>) -> Self {
        self.background = Some(background);
        self
    }
}

#[async_trait]
impl LocationProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn request_foreground_permission(&self) -> Result<PermissionStatus> {
        if let Some(delay) = self.permission_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.foreground)
    }

    async fn request_background_permission(&self) -> Result<PermissionStatus> {
        Ok(self.background_permission)
    }

    async fn current_position(&self, _accuracy: Accuracy) -> Result<LocationSample> {
        self.initial
            .clone()
            .ok_or_else(|| TrailError::LocationUnavailable("no fix yet".to_string()))
    }

    async fn watch_position(&self, _options: WatchOptions) -> Result<LocationWatch> {
        let rx = self
            .feed
            .lock()
            .take()
            .ok_or_else(|| TrailError::LocationUnavailable("feed already taken".to_string()))?;
        Ok(LocationWatch::new(rx, None))
    }

    fn background_updates(&self) -> Option<Arc<dyn BackgroundUpdates>> {
        self.background
            .clone()
            .map(|bg| bg as Arc<dyn BackgroundUpdates>)
    }
}

/// Backend that records submissions and can be told to fail
#[derive(Default)]
pub struct MockTrailApi {
    pub fail: AtomicBool,
    pub submissions: Mutex<Vec<TrailSubmission>>,
}

#[async_trait]
impl TrailApi for MockTrailApi {
    async fn create_trail(&self, submission: &TrailSubmission) -> Result<TrailRecord> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TrailError::Submit("HTTP 503 Service Unavailable: try later".to_string()));
        }
        self.submissions.lock().push(submission.clone());
        Ok(TrailRecord::from(submission))
    }
}

pub fn memory_store() -> (Arc<MemoryStore>, DurableRecordingStore) {
    let memory = Arc::new(MemoryStore::new());
    (memory.clone(), DurableRecordingStore::new(memory))
}

/// Short timeouts and a fast ticker for tests
pub fn test_options() -> ControllerOptions {
    ControllerOptions {
        permission_timeout: Duration::from_millis(200),
        position_timeout: Duration::from_millis(200),
        tick_interval: Duration::from_millis(20),
        ..ControllerOptions::default()
    }
}

#[allow(dead_code)]
pub fn controller(
    store: DurableRecordingStore,
    provider: MockProvider,
    api: Arc<MockTrailApi>,
) -> SessionController {
    SessionController::new(test_options(), store, Arc::new(provider), api)
}

/// Wait until the foreground watcher has applied `points` fixes
#[allow(dead_code)]
pub async fn wait_for_points(controller: &SessionController, points: usize) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while controller.live_stats().points < points {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "session never reached {} points", points);
}

/// Wait until the durable track holds `points` coordinates
#[allow(dead_code)]
pub async fn wait_for_durable(store: &DurableRecordingStore, points: usize) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if store.load_track().await.map_or(0, |t| t.len()) >= points {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "durable track never reached {} points", points);
}
