// src/main.rs
//! Trail Recorder - record GPS walks that survive crashes

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use trail_recorder::{
    config::RecorderConfig,
    display,
    export::TrackFormat,
    gps::source::available_serial_ports,
    recorder::{self, Recorder, RunOutcome},
    session::{draft::Difficulty, TrailMetadata},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "GPS trail recorder with crash-safe sessions", long_about = None)]
struct Cli {
    #[command(flatten)]
    source: SourceArgs,

    /// Persist the given source settings to the config file
    #[arg(long)]
    save_config: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Location source: gpsd, serial or replay
    #[arg(long, global = true)]
    source: Option<String>,

    /// Serial device for the serial source
    #[arg(long, global = true)]
    port: Option<String>,

    #[arg(long, global = true)]
    baudrate: Option<u32>,

    /// gpsd host
    #[arg(long, global = true)]
    host: Option<String>,

    /// gpsd port
    #[arg(long, global = true)]
    gpsd_port: Option<u16>,

    /// NMEA log to replay
    #[arg(long, global = true)]
    replay: Option<PathBuf>,

    /// Delay between replayed fixes in milliseconds
    #[arg(long, global = true)]
    interval_ms: Option<u64>,

    /// Minimum movement in meters before a fix is recorded
    #[arg(long, global = true)]
    min_distance: Option<f64>,

    /// Track only while in the foreground
    #[arg(long, global = true)]
    no_background: bool,

    /// Backend base URL; trails are archived locally when absent
    #[arg(long, global = true)]
    backend: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record a trail, continuing an interrupted one if present; Ctrl+C stops and saves it
    Record(TrailArgs),
    /// Continue an interrupted recording
    Resume(TrailArgs),
    /// Show what the store holds about an unfinished recording
    Status,
    /// Drop an unfinished recording without saving
    Discard,
    /// Send a trail whose earlier upload failed
    Upload,
    /// List serial ports
    Ports,
    /// Export the unfinished recording's track
    Export {
        file: PathBuf,
        /// gpx or geojson; guessed from the extension when omitted
        #[arg(long)]
        format: Option<TrackFormat>,
    },
}

#[derive(Args, Debug)]
struct TrailArgs {
    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    description: Option<String>,

    /// Comma separated tags
    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,

    /// easy, moderate or hard
    #[arg(long)]
    difficulty: Option<Difficulty>,

    #[arg(long)]
    city: Option<String>,

    #[arg(long)]
    country: Option<String>,

    /// Disable the live dashboard
    #[arg(long)]
    quiet: bool,
}

impl TrailArgs {
    fn metadata(&self) -> TrailMetadata {
        TrailMetadata {
            name: self.name.clone(),
            description: self.description.clone(),
            photo: None,
            tags: self.tags.clone(),
            difficulty: self.difficulty,
            city: self.city.clone(),
            country: self.country.clone(),
        }
    }
}

fn apply_overrides(config: &mut RecorderConfig, args: &SourceArgs) {
    if let Some(ref source) = args.source {
        config.update_source(source);
    }
    if let Some(ref port) = args.port {
        let baudrate = args.baudrate.or(config.serial_baudrate).unwrap_or(9600);
        config.update_serial(port.clone(), baudrate);
    }
    if let Some(ref host) = args.host {
        let port = args.gpsd_port.or(config.gpsd_port).unwrap_or(2947);
        config.update_gpsd(host.clone(), port);
    }
    if let Some(ref file) = args.replay {
        let interval = args.interval_ms.or(config.replay_interval_ms).unwrap_or(1000);
        config.update_replay(file.clone(), interval);
    }
    if let Some(distance) = args.min_distance {
        let interval = config.min_interval_ms;
        config.update_sampling(distance, interval);
    }
    if args.no_background {
        config.enable_background = false;
    }
    if let Some(ref url) = args.backend {
        config.backend_url = Some(url.clone());
    }
}

fn report(outcome: RunOutcome) {
    match outcome {
        RunOutcome::Saved(record) => {
            println!("Saved trail {} ({})", record.name.as_deref().unwrap_or("unnamed"), record.id);
        }
        RunOutcome::Discarded => println!("Not enough data recorded; nothing saved."),
        RunOutcome::Pending(e) => {
            eprintln!("Trail not saved: {}", e);
            eprintln!("The trail is kept; run `trail-recorder upload` to try again.");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout belongs to the dashboard
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "trail_recorder=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = RecorderConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Using default configuration");
        RecorderConfig::default()
    });
    apply_overrides(&mut config, &cli.source);
    if cli.save_config {
        config.save().context("Failed to save configuration")?;
        tracing::info!("Configuration saved");
    }

    match cli.command {
        Command::Record(args) => {
            tracing::info!(source = %config.source_type, "Starting recording");
            let dashboard = !args.quiet && display::should_use_dashboard();
            let mut recorder = Recorder::from_config(config, dashboard)?;
            let outcome = recorder.record(args.metadata()).await?;
            report(outcome);
        }
        Command::Resume(args) => {
            let dashboard = !args.quiet && display::should_use_dashboard();
            let mut recorder = Recorder::from_config(config, dashboard)?;
            match recorder.resume(args.metadata()).await? {
                Some(outcome) => report(outcome),
                None => println!("No unfinished recording to resume."),
            }
        }
        Command::Status => recorder::print_status(&config).await?,
        Command::Discard => {
            if recorder::discard(&config).await? {
                println!("Unfinished recording discarded.");
            } else {
                println!("No unfinished recording.");
            }
        }
        Command::Upload => match recorder::upload_pending(&config).await? {
            Some(outcome) => report(outcome),
            None => println!("No trail waiting for upload."),
        },
        Command::Ports => {
            let ports = available_serial_ports()?;
            if ports.is_empty() {
                println!("No serial ports found.");
            } else {
                println!("Available serial ports:");
                for (name, kind) in ports {
                    println!("  {} - {}", name, kind);
                }
            }
        }
        Command::Export { file, format } => {
            let format = format.unwrap_or_else(|| TrackFormat::from_path(&file));
            recorder::export_unfinished(&config, &file, format)
                .await
                .with_context(|| format!("Failed to export to {}", file.display()))?;
            println!("Exported {} to {}", format.display_name(), file.display());
        }
    }

    Ok(())
}
