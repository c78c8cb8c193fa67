// src/gps/source.rs
//! Concrete location sources: gpsd, serial NMEA receivers and NMEA log replay

use super::{
    data::{FixState, LocationSample},
    filter::SampleFilter,
    gpsd, nmea,
    provider::{
        Accuracy, BackgroundHandler, BackgroundOptions, BackgroundUpdates, LocationProvider,
        LocationWatch, PermissionStatus, WatchOptions,
    },
};
use crate::{
    config::RecorderConfig,
    error::{Result, TrailError},
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    sync::mpsc,
    task::JoinHandle,
    time::sleep,
};
use tokio_serial::SerialPortBuilderExt;

/// Location source configuration
#[derive(Debug, Clone)]
pub enum LocationSource {
    Serial { port: String, baudrate: u32 },
    Gpsd { host: String, port: u16, background: bool },
    Replay { file: PathBuf, interval: Duration },
}

impl LocationSource {
    pub fn from_config(config: &RecorderConfig) -> Result<Self> {
        match config.source_type.as_str() {
            "serial" => Ok(LocationSource::Serial {
                port: config
                    .serial_port
                    .clone()
                    .ok_or_else(|| TrailError::Config("serial source needs serial_port".to_string()))?,
                baudrate: config.serial_baudrate.unwrap_or(9600),
            }),
            "gpsd" => Ok(LocationSource::Gpsd {
                host: config.gpsd_host.clone().unwrap_or_else(|| "localhost".to_string()),
                port: config.gpsd_port.unwrap_or(2947),
                background: config.enable_background,
            }),
            "replay" => Ok(LocationSource::Replay {
                file: config
                    .replay_file
                    .clone()
                    .ok_or_else(|| TrailError::Config("replay source needs replay_file".to_string()))?,
                interval: Duration::from_millis(config.replay_interval_ms.unwrap_or(1000)),
            }),
            other => Err(TrailError::Config(format!("Unknown source type: {}", other))),
        }
    }

    pub fn into_provider(self) -> Arc<dyn LocationProvider> {
        match self {
            LocationSource::Serial { port, baudrate } => Arc::new(SerialProvider::new(port, baudrate)),
            LocationSource::Gpsd { host, port, background } => {
                Arc::new(GpsdProvider::new(host, port, background))
            }
            LocationSource::Replay { file, interval } => Arc::new(ReplayProvider::new(file, interval)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum LineFormat {
    Nmea,
    GpsdJson,
}

/// Feed one line into the fix state; returns a sample when the line completed a usable fix
fn parse_line(state: &mut FixState, format: LineFormat, line: &str) -> Option<LocationSample> {
    let has_position = match format {
        LineFormat::Nmea => nmea::parse_nmea_sentence(state, line),
        LineFormat::GpsdJson => match gpsd::parse_gpsd_json(state, line) {
            Ok(has_position) => has_position,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping gpsd line");
                false
            }
        },
    };

    if has_position {
        state.to_sample()
    } else {
        None
    }
}

/// Read lines until the first fix that satisfies the accuracy
async fn next_fix<R>(reader: &mut R, format: LineFormat, accuracy: Accuracy) -> Result<LocationSample>
where
    R: AsyncBufRead + Unpin,
{
    let mut state = FixState::new();
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Err(TrailError::LocationUnavailable("source ended before a fix".to_string()));
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(sample) = parse_line(&mut state, format, line) {
            if accuracy.admits(&sample) {
                tracing::debug!(fix = %state.get_fix_description(), "Initial fix acquired");
                return Ok(sample);
            }
        }
    }
}

/// Spawn a reader that turns raw lines into filtered samples.
///
/// With `pacing` set, the task sleeps after each delivered sample (log replay).
fn spawn_fix_stream<R>(
    mut reader: R,
    format: LineFormat,
    options: WatchOptions,
    pacing: Option<Duration>,
    tx: mpsc::Sender<LocationSample>,
    source: &'static str,
) -> JoinHandle<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut state = FixState::new();
        let mut filter = SampleFilter::new(&options);
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    tracing::info!(source, "Location stream ended");
                    break;
                }
                Ok(_) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let Some(sample) = parse_line(&mut state, format, line) else {
                        continue;
                    };
                    if !options.accuracy.admits(&sample) || !filter.accept(&sample) {
                        continue;
                    }
                    if tx.send(sample).await.is_err() {
                        // Subscriber went away
                        break;
                    }
                    if let Some(delay) = pacing {
                        sleep(delay).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(source, error = %e, "Error reading location stream");
                    break;
                }
            }
        }
    })
}

fn permission_from_io(error: &std::io::Error) -> Option<PermissionStatus> {
    (error.kind() == std::io::ErrorKind::PermissionDenied).then_some(PermissionStatus::Denied)
}

/// gpsd daemon source. Background delivery uses a second, independent connection.
pub struct GpsdProvider {
    host: String,
    port: u16,
    background: Option<Arc<GpsdBackground>>,
}

impl GpsdProvider {
    pub fn new(host: String, port: u16, background: bool) -> Self {
        let background = background.then(|| Arc::new(GpsdBackground::new(host.clone(), port)));
        Self { host, port, background }
    }
}

#[async_trait]
impl LocationProvider for GpsdProvider {
    fn name(&self) -> &str {
        "gpsd"
    }

    async fn request_foreground_permission(&self) -> Result<PermissionStatus> {
        match gpsd::connect_gpsd(&self.host, self.port).await {
            Ok(_) => Ok(PermissionStatus::Granted),
            Err(TrailError::Io(e)) => permission_from_io(&e).ok_or(TrailError::Io(e)),
            Err(e) => Err(e),
        }
    }

    async fn request_background_permission(&self) -> Result<PermissionStatus> {
        Ok(if self.background.is_some() {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        })
    }

    async fn current_position(&self, accuracy: Accuracy) -> Result<LocationSample> {
        let mut reader = gpsd::connect_gpsd(&self.host, self.port).await?;
        next_fix(&mut reader, LineFormat::GpsdJson, accuracy).await
    }

    async fn watch_position(&self, options: WatchOptions) -> Result<LocationWatch> {
        tracing::info!(host = %self.host, port = self.port, "Connecting to gpsd");
        let reader = gpsd::connect_gpsd(&self.host, self.port).await?;

        let (tx, rx) = mpsc::channel(64);
        let task = spawn_fix_stream(reader, LineFormat::GpsdJson, options, None, tx, "gpsd");
        Ok(LocationWatch::new(rx, Some(task)))
    }

    fn background_updates(&self) -> Option<Arc<dyn BackgroundUpdates>> {
        self.background.clone().map(|b| b as Arc<dyn BackgroundUpdates>)
    }
}

/// Background registrations against gpsd, one reader task per task name
pub struct GpsdBackground {
    host: String,
    port: u16,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl GpsdBackground {
    pub fn new(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            tasks: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl BackgroundUpdates for GpsdBackground {
    async fn register(
        &self,
        task_name: &str,
        options: BackgroundOptions,
        handler: Arc<dyn BackgroundHandler>,
    ) -> Result<()> {
        let reader = gpsd::connect_gpsd(&self.host, self.port).await?;

        tracing::info!(
            task = task_name,
            title = %options.notification.title,
            body = %options.notification.body,
            "Background tracking active"
        );

        let (tx, mut rx) = mpsc::channel(64);
        let stream = spawn_fix_stream(reader, LineFormat::GpsdJson, options.watch, None, tx, "gpsd-background");
        let task = tokio::spawn(async move {
            while let Some(sample) = rx.recv().await {
                handler.on_locations(vec![sample]).await;
            }
            if !stream.is_finished() {
                stream.abort();
            } else {
                handler
                    .on_error(TrailError::Connection("gpsd background stream ended".to_string()))
                    .await;
            }
        });

        if let Some(previous) = self.tasks.lock().insert(task_name.to_string(), task) {
            previous.abort();
        }
        Ok(())
    }

    async fn deregister(&self, task_name: &str) -> Result<()> {
        match self.tasks.lock().remove(task_name) {
            Some(task) => {
                task.abort();
                tracing::info!(task = task_name, "Background tracking stopped");
            }
            None => tracing::debug!(task = task_name, "Background task was not registered"),
        }
        Ok(())
    }

    async fn is_registered(&self, task_name: &str) -> bool {
        self.tasks
            .lock()
            .get(task_name)
            .map_or(false, |task| !task.is_finished())
    }
}

/// NMEA receiver on a serial port. The port is exclusive, so there is no background delivery.
pub struct SerialProvider {
    port: String,
    baudrate: u32,
}

impl SerialProvider {
    pub fn new(port: String, baudrate: u32) -> Self {
        Self { port, baudrate }
    }

    fn open(&self) -> Result<BufReader<tokio_serial::SerialStream>> {
        let serial = tokio_serial::new(&self.port, self.baudrate)
            .timeout(Duration::from_millis(1000))
            .open_native_async()?;
        Ok(BufReader::new(serial))
    }
}

#[async_trait]
impl LocationProvider for SerialProvider {
    fn name(&self) -> &str {
        "serial"
    }

    async fn request_foreground_permission(&self) -> Result<PermissionStatus> {
        match self.open() {
            Ok(_) => Ok(PermissionStatus::Granted),
            Err(TrailError::Serial(e))
                if e.kind == tokio_serial::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) =>
            {
                Ok(PermissionStatus::Denied)
            }
            Err(e) => Err(e),
        }
    }

    async fn current_position(&self, accuracy: Accuracy) -> Result<LocationSample> {
        let mut reader = self.open()?;
        next_fix(&mut reader, LineFormat::Nmea, accuracy).await
    }

    async fn watch_position(&self, options: WatchOptions) -> Result<LocationWatch> {
        tracing::info!(port = %self.port, baudrate = self.baudrate, "Opening serial GPS");
        let reader = self.open()?;

        let (tx, rx) = mpsc::channel(64);
        let task = spawn_fix_stream(reader, LineFormat::Nmea, options, None, tx, "serial");
        Ok(LocationWatch::new(rx, Some(task)))
    }
}

/// Replays an NMEA log file at a fixed pace
pub struct ReplayProvider {
    file: PathBuf,
    interval: Duration,
}

impl ReplayProvider {
    pub fn new(file: PathBuf, interval: Duration) -> Self {
        Self { file, interval }
    }

    async fn open(&self) -> Result<BufReader<tokio::fs::File>> {
        let file = tokio::fs::File::open(&self.file).await?;
        Ok(BufReader::new(file))
    }
}

#[async_trait]
impl LocationProvider for ReplayProvider {
    fn name(&self) -> &str {
        "replay"
    }

    async fn request_foreground_permission(&self) -> Result<PermissionStatus> {
        match self.open().await {
            Ok(_) => Ok(PermissionStatus::Granted),
            Err(TrailError::Io(e)) => permission_from_io(&e).ok_or(TrailError::Io(e)),
            Err(e) => Err(e),
        }
    }

    async fn current_position(&self, accuracy: Accuracy) -> Result<LocationSample> {
        let mut reader = self.open().await?;
        next_fix(&mut reader, LineFormat::Nmea, accuracy).await
    }

    async fn watch_position(&self, options: WatchOptions) -> Result<LocationWatch> {
        tracing::info!(file = %self.file.display(), "Replaying NMEA log");
        let reader = self.open().await?;

        let (tx, rx) = mpsc::channel(64);
        let task = spawn_fix_stream(reader, LineFormat::Nmea, options, Some(self.interval), tx, "replay");
        Ok(LocationWatch::new(rx, Some(task)))
    }
}

/// List available serial ports as (name, kind)
pub fn available_serial_ports() -> Result<Vec<(String, String)>> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| TrailError::Other(format!("Failed to list serial ports: {}", e)))?;

    Ok(ports
        .into_iter()
        .map(|port| (port.port_name, format!("{:?}", port.port_type)))
        .collect())
}
