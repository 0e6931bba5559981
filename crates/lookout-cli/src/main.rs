//! # lookout
//!
//! Headless client for the CV tracker: keeps a live dashboard in sync with
//! the frame stream and status endpoint, and issues one-shot control
//! commands.

#![deny(unsafe_code)]

mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lookout_control::{HttpTrackerApi, TrackerApi};
use lookout_core::{DetectionMode, TrackedColor};
use lookout_settings::{LogFormat, LookoutSettings};
use serde_json::Value;

/// Lookout tracker client.
#[derive(Parser, Debug)]
#[command(name = "lookout", version, about = "Headless client for the CV tracker")]
struct Cli {
    /// Settings file (default: ~/.lookout/settings.json).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Control API base URL, e.g. `http://localhost:8000/api`.
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Frame stream URL, e.g. `ws://localhost:8000/ws/video`.
    #[arg(long, global = true)]
    ws_url: Option<String>,

    /// Log filter when `RUST_LOG` is unset.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Follow the stream and status, logging dashboard changes (default).
    Watch {
        /// Start the tracker before connecting.
        #[arg(long)]
        start: bool,
    },
    /// Print tracker status.
    Status,
    /// Print the tracker's raw stats.
    Stats,
    /// Print available detection modes.
    Modes,
    /// Start the tracker.
    Start,
    /// Stop the tracker.
    Stop,
    /// Switch detection mode (`color`, `object`, `object_yolo`).
    Mode {
        /// Mode wire name.
        mode: DetectionMode,
    },
    /// Enable or disable one colour.
    ToggleColor {
        /// `Red`, `Blue`, `Yellow` or `Green`.
        color: TrackedColor,
    },
    /// Update detection settings.
    Settings {
        /// Minimum contour area.
        #[arg(long, default_value_t = lookout_core::constants::DEFAULT_MIN_AREA)]
        min_area: u32,
        /// Capture device index.
        #[arg(long, default_value_t = 0)]
        camera_index: u32,
    },
}

impl Cli {
    /// Load settings and apply command-line overrides on top.
    fn resolve_settings(&self) -> Result<LookoutSettings> {
        let path = self
            .settings
            .clone()
            .unwrap_or_else(lookout_settings::settings_path);
        let mut settings = lookout_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;

        if let Some(url) = &self.api_url {
            settings.api.base_url.clone_from(url);
        }
        if let Some(url) = &self.ws_url {
            settings.stream.url.clone_from(url);
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        lookout_settings::validate(&settings).context("Invalid settings")?;
        Ok(settings)
    }
}

fn init_logging(settings: &LookoutSettings) {
    match settings.logging.format {
        LogFormat::Compact => lookout_core::logging::init_subscriber(&settings.logging.level),
        LogFormat::Json => lookout_core::logging::init_json_subscriber(&settings.logging.level),
    }
}

fn print_json(value: &Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{text}");
    Ok(())
}

async fn run_oneshot(api: &dyn TrackerApi, command: Command) -> Result<()> {
    let output: Value = match command {
        Command::Status => serde_json::to_value(api.status().await?)?,
        Command::Stats => api.stats().await?,
        Command::Modes => serde_json::to_value(api.modes().await?)?,
        Command::Start => serde_json::to_value(api.start().await?)?,
        Command::Stop => serde_json::to_value(api.stop().await?)?,
        Command::Mode { mode } => serde_json::to_value(api.set_mode(mode).await?)?,
        Command::ToggleColor { color } => serde_json::to_value(api.toggle_color(color).await?)?,
        Command::Settings {
            min_area,
            camera_index,
        } => serde_json::to_value(api.update_settings(min_area, camera_index).await?)?,
        Command::Watch { .. } => anyhow::bail!("watch is not a one-shot command"),
    };
    print_json(&output)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.resolve_settings()?;
    init_logging(&settings);

    let api: Arc<dyn TrackerApi> = Arc::new(
        HttpTrackerApi::new(&settings.api.base_url, settings.api.request_timeout())
            .context("Failed to create tracker API client")?,
    );

    match cli.command.unwrap_or(Command::Watch { start: false }) {
        Command::Watch { start } => watch::run(&settings, api, start).await,
        command => run_oneshot(api.as_ref(), command)
            .await
            .context("Tracker request failed"),
    }
}
