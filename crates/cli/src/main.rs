//! Parking occupancy CLI
//!
//! Operator tool for computing location identities, validating camera
//! topology files and running aggregation rounds locally.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{identity, round, topology};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Parking occupancy CLI
#[derive(Parser)]
#[command(name = "occ")]
#[command(author, version, about = "CLI for parking occupancy aggregation", long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compute the identity of a coordinate
    Identity {
        /// Latitude in degrees
        #[arg(allow_negative_numbers = true)]
        latitude: f64,

        /// Longitude in degrees
        #[arg(allow_negative_numbers = true)]
        longitude: f64,
    },

    /// Camera topology commands
    #[command(subcommand)]
    Topology(TopologyCommands),

    /// Run one aggregation round per location and print the counts
    Round {
        /// Topology file (toml, yaml or json)
        topology: PathBuf,

        /// ONNX vacancy model
        #[arg(long, env = "OCCUPANCY_MODEL_PATH")]
        model: PathBuf,

        /// Expected hex SHA-256 of the model
        #[arg(long, env = "OCCUPANCY_MODEL_SHA256")]
        model_sha256: Option<String>,

        /// Square model input size in pixels
        #[arg(long, default_value_t = 128)]
        input_size: u32,

        /// Only run the location with this name
        #[arg(long, short)]
        location: Option<String>,

        /// Per-camera timeout in seconds
        #[arg(long, default_value_t = 10)]
        camera_timeout: u64,

        /// Round deadline in seconds
        #[arg(long, default_value_t = 30)]
        round_timeout: u64,

        /// ffmpeg binary for rtsp, rtmp and srt cameras
        #[arg(long, env = "OCCUPANCY_FFMPEG_PATH", default_value = "ffmpeg")]
        ffmpeg: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum TopologyCommands {
    /// Validate a topology file and list its locations
    Validate {
        /// Topology file (toml, yaml or json)
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Identity {
            latitude,
            longitude,
        } => {
            identity::show_identity(latitude, longitude, cli.format)?;
        }
        Commands::Topology(topology_cmd) => match topology_cmd {
            TopologyCommands::Validate { path } => {
                topology::validate_topology(&path, cli.format)?;
            }
        },
        Commands::Round {
            topology,
            model,
            model_sha256,
            input_size,
            location,
            camera_timeout,
            round_timeout,
            ffmpeg,
        } => {
            let options = round::RoundOptions {
                topology,
                model,
                model_sha256,
                input_size,
                location,
                camera_timeout,
                round_timeout,
                ffmpeg,
            };
            round::run_round(options, cli.format).await?;
        }
    }

    Ok(())
}
