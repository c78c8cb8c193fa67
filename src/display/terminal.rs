// src/display/terminal.rs
//! Terminal dashboard for a recording in progress

use crate::{
    error::Result,
    gps::data::Coordinate,
    session::state::{LiveStats, SessionStatus, TrackingMode},
};
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType, DisableLineWrap, EnableLineWrap},
};
use std::{
    io::{self, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::watch;

pub struct TerminalDisplay {
    title: String,
}

impl TerminalDisplay {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into() }
    }

    /// Redraw on every published update (and at least once a second) until `running` clears
    pub async fn run(
        &self,
        mut stats: watch::Receiver<LiveStats>,
        running: Arc<AtomicBool>,
    ) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(stdout, Hide, DisableLineWrap)?;

        while running.load(Ordering::Relaxed) {
            execute!(stdout, Clear(ClearType::All), MoveTo(0, 0))?;

            let snapshot = stats.borrow_and_update().clone();
            self.render(&mut stdout, &snapshot)?;
            stdout.flush()?;

            tokio::select! {
                changed = stats.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            }
        }

        execute!(stdout, Show, EnableLineWrap)?;
        Ok(())
    }

    /// Render one frame
    pub fn render(&self, out: &mut impl Write, stats: &LiveStats) -> Result<()> {
        execute!(
            out,
            SetForegroundColor(Color::Green),
            Print("=".repeat(60)),
            Print("\n"),
            Print(&self.title),
            Print("\n"),
            Print("=".repeat(60)),
            Print("\n"),
            ResetColor
        )?;

        self.render_session_section(out, stats)?;
        self.render_position_section(out, stats)?;
        self.render_metrics_section(out, stats)?;
        if !stats.notices.is_empty() {
            self.render_notices_section(out, stats)?;
        }

        execute!(
            out,
            SetForegroundColor(Color::Green),
            Print("=".repeat(60)),
            Print("\n"),
            Print("Press Ctrl+C to stop recording"),
            Print("\n"),
            ResetColor
        )?;
        Ok(())
    }

    fn render_session_section(&self, out: &mut impl Write, stats: &LiveStats) -> Result<()> {
        let (label, color) = match stats.status {
            SessionStatus::Recording if stats.stalled => ("RECORDING (waiting for fix)", Color::Yellow),
            SessionStatus::Recording => ("RECORDING", Color::Red),
            SessionStatus::Stopping => ("STOPPED", Color::Yellow),
            SessionStatus::Idle => ("IDLE", Color::Grey),
        };
        let mode = match stats.tracking_mode {
            TrackingMode::Full => "foreground + background",
            TrackingMode::ForegroundOnly => "foreground only",
        };

        execute!(
            out,
            SetForegroundColor(Color::Yellow),
            Print("SESSION:\n"),
            ResetColor,
            Print("  Status:    "),
            SetForegroundColor(color),
            Print(format!("{}\n", label)),
            ResetColor,
            Print(format!("  Tracking:  {}\n", mode)),
            Print(format!("  Elapsed:   {}\n", stats.formatted_duration()))
        )?;

        let age = match stats.last_update_age_secs {
            Some(secs) => format!("{}s ago", secs),
            None => "none yet".to_string(),
        };
        execute!(out, Print(format!("  Last fix:  {}\n\n", age)))?;
        Ok(())
    }

    fn render_position_section(&self, out: &mut impl Write, stats: &LiveStats) -> Result<()> {
        execute!(
            out,
            SetForegroundColor(Color::Cyan),
            Print("POSITION:\n"),
            ResetColor
        )?;

        match stats.current_location {
            Some(Coordinate { latitude, longitude }) => execute!(
                out,
                Print(format!("  Latitude:  {}\n", format_coordinate(latitude))),
                Print(format!("  Longitude: {}\n", format_coordinate(longitude)))
            )?,
            None => execute!(out, Print("  Acquiring location...\n"))?,
        }
        execute!(out, Print(format!("  Points:    {:>12}\n\n", stats.points)))?;
        Ok(())
    }

    fn render_metrics_section(&self, out: &mut impl Write, stats: &LiveStats) -> Result<()> {
        execute!(
            out,
            SetForegroundColor(Color::Magenta),
            Print("METRICS:\n"),
            ResetColor,
            Print(format!("  Distance:  {:>12}\n", stats.formatted_distance())),
            Print(format!("  Pace:      {:>12} min/km\n", stats.pace)),
            Print(format!("  Speed:     {:>12.1} km/h\n", stats.current_speed_kmh)),
            Print(format!("  Max speed: {:>12.1} km/h\n", stats.max_speed_kmh)),
            Print(format!("  Max elev:  {:>12.0} m\n\n", stats.max_elevation_m))
        )?;
        Ok(())
    }

    fn render_notices_section(&self, out: &mut impl Write, stats: &LiveStats) -> Result<()> {
        execute!(
            out,
            SetForegroundColor(Color::Blue),
            Print("NOTICES:\n"),
            ResetColor
        )?;
        for notice in &stats.notices {
            execute!(out, Print(format!("  ! {}\n", notice)))?;
        }
        execute!(out, Print("\n"))?;
        Ok(())
    }
}

impl Default for TerminalDisplay {
    fn default() -> Self {
        Self::new("Trail Recorder")
    }
}

fn format_coordinate(value: f64) -> String {
    format!("{:>12.6}°", value)
}

/// One-shot plain text summary for non-interactive output
pub fn summary_lines(stats: &LiveStats) -> Vec<String> {
    let mut lines = vec![
        format!("Status:      {}", stats.status),
        format!("Elapsed:     {}", stats.formatted_duration()),
        format!("Distance:    {}", stats.formatted_distance()),
        format!("Pace:        {} min/km", stats.pace),
        format!("Points:      {}", stats.points),
    ];
    if stats.max_speed_kmh > 0.0 {
        lines.push(format!("Max speed:   {:.1} km/h", stats.max_speed_kmh));
    }
    if stats.max_elevation_m > 0.0 {
        lines.push(format!("Max elev:    {:.0} m", stats.max_elevation_m));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::state::Notice;

    fn recording() -> LiveStats {
        LiveStats {
            status: SessionStatus::Recording,
            tracking_mode: TrackingMode::ForegroundOnly,
            elapsed_secs: 600,
            distance_m: 1111.95,
            pace: "9:00".to_string(),
            current_speed_kmh: 6.7,
            max_speed_kmh: 8.2,
            max_elevation_m: 312.0,
            points: 42,
            current_location: Some(Coordinate::new(47.3769, 8.5417)),
            last_update_age_secs: Some(2),
            stalled: false,
            notices: vec![Notice::BackgroundUnavailable],
        }
    }

    #[test]
    fn test_render_recording_frame() {
        let mut out = Vec::new();
        TerminalDisplay::default().render(&mut out, &recording()).unwrap();
        let text = String::from_utf8_lossy(&out);

        assert!(text.contains("RECORDING"));
        assert!(text.contains("foreground only"));
        assert!(text.contains("1.11km"));
        assert!(text.contains("9:00"));
        assert!(text.contains("47.376900"));
        assert!(text.contains("NOTICES:"));
    }

    #[test]
    fn test_render_without_location() {
        let mut stats = recording();
        stats.current_location = None;
        stats.notices.clear();
        let mut out = Vec::new();
        TerminalDisplay::default().render(&mut out, &stats).unwrap();
        let text = String::from_utf8_lossy(&out);

        assert!(text.contains("Acquiring location..."));
        assert!(!text.contains("NOTICES:"));
    }

    #[test]
    fn test_summary_lines() {
        let lines = summary_lines(&recording());
        assert!(lines.iter().any(|l| l.contains("10m 0s")));
        assert!(lines.iter().any(|l| l.contains("Max elev")));
    }
}
