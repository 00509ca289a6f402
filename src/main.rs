// SPDX-License-Identifier: GPL-3.0-only

use camera_recorder::constants::app_info;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camera-recorder")]
#[command(about = "Time-bounded video recorder with pause, resume and torch control")]
#[command(version = app_info::version())]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FacingArg {
    Back,
    Front,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras and flash LEDs
    List {
        /// List the virtual cameras instead of hardware
        #[arg(long = "virtual")]
        virtual_camera: bool,
    },

    /// Record a video
    ///
    /// Type p/r/s/c/t + Enter while recording to pause, resume, stop,
    /// cancel or toggle the torch. Ctrl+C stops; a second Ctrl+C cancels.
    Record(RecordArgs),

    /// Print the effective configuration and where it is stored
    Config,
}

#[derive(clap::Args)]
pub struct RecordArgs {
    /// Minimum take length in seconds (0 = no minimum)
    #[arg(long)]
    pub min: Option<f64>,

    /// Maximum take length in seconds (0 = no maximum)
    #[arg(long)]
    pub max: Option<f64>,

    #[arg(long)]
    pub width: Option<u32>,

    #[arg(long)]
    pub height: Option<u32>,

    #[arg(long)]
    pub fps: Option<u32>,

    /// Bit-rate in kilobits per second
    #[arg(long)]
    pub bitrate: Option<u32>,

    /// Camera to prefer
    #[arg(short, long, value_enum)]
    pub facing: Option<FacingArg>,

    /// Camera index (from 'camera-recorder list'), overriding --facing
    #[arg(short, long)]
    pub camera: Option<usize>,

    /// Output directory (default: ~/Videos/recorder)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output file name without extension
    #[arg(short, long)]
    pub name: Option<String>,

    /// Append the start time to the file name (e.g. sample_20250101_120000)
    #[arg(long)]
    pub timestamp: bool,

    /// Light the torch for the whole take
    #[arg(long)]
    pub torch: bool,

    /// Record from the virtual camera
    #[arg(long = "virtual")]
    pub virtual_camera: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_recorder=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List { virtual_camera } => cli::list_cameras(virtual_camera),
        Commands::Record(args) => cli::record_video(args),
        Commands::Config => cli::show_config(),
    }
}
