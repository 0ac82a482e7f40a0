// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use depth_viewer::backends::sensor::{RangeMode, SensorBackendType};
use depth_viewer::config::Config;
use depth_viewer::depth::IntensityMapping;
use std::path::PathBuf;
use tracing::warn;

mod cli;

#[derive(Parser)]
#[command(name = "depth-viewer")]
#[command(about = "Real-time grayscale viewer for depth sensor streams")]
#[command(version)]
#[command(subcommand_required = false)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (default: ~/.config/depth-viewer/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the simulated sensor instead of a Kinect
    #[arg(long, global = true)]
    simulated: bool,

    /// Use the near reliable range (400-3000mm)
    #[arg(long, global = true)]
    near: bool,

    /// Stretch the reliable range over the full intensity span
    #[arg(long, global = true)]
    normalized: bool,

    /// Render loop cadence in frames per second
    #[arg(long, global = true)]
    render_fps: Option<u32>,

    /// Make the simulated sensor fail at start
    #[arg(long, global = true, hide = true)]
    fail_start: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the depth stream in the terminal (default)
    View,

    /// List attached depth sensors
    List,

    /// Run without display and print statistics
    Headless {
        /// Run duration in seconds
        #[arg(short, long, default_value = "10")]
        seconds: u64,
    },
}

impl Cli {
    /// Apply command line overrides on top of the loaded configuration
    fn apply(&self, config: &mut Config) {
        if self.simulated {
            config.backend = SensorBackendType::Simulated;
        }
        if self.near {
            config.range_mode = RangeMode::Near;
        }
        if self.normalized {
            config.mapping = IntensityMapping::Normalized;
        }
        if let Some(fps) = self.render_fps {
            config.render_fps = fps;
        }
        if self.fail_start {
            config.fail_start = true;
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Config {
    let result = match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    result.unwrap_or_else(|e| {
        warn!(error = %e, "Ignoring configuration, using defaults");
        Config::default()
    })
}

/// Where log output goes for a subcommand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogSink {
    /// Standard error, leaving stdout to command output
    Stderr,
    /// Discarded; the terminal viewer owns the screen
    Discard,
}

impl LogSink {
    fn for_command(command: Option<&Commands>) -> Self {
        match command {
            Some(Commands::View) | None => LogSink::Discard,
            Some(Commands::List) | Some(Commands::Headless { .. }) => LogSink::Stderr,
        }
    }
}

fn init_logging(sink: LogSink) {
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=depth_viewer=debug, RUST_LOG=info
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true);

    match sink {
        LogSink::Stderr => builder.with_writer(std::io::stderr).init(),
        LogSink::Discard => builder.with_writer(std::io::sink).init(),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(LogSink::for_command(cli.command.as_ref()));

    let mut config = load_config(cli.config.as_ref());
    cli.apply(&mut config);
    config.validate()?;

    match cli.command {
        Some(Commands::List) => cli::list_sensors(&config),
        Some(Commands::Headless { seconds }) => cli::run_headless(config, seconds),
        Some(Commands::View) | None => cli::run_viewer(config),
    }
}
