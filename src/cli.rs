//! # Command Line Interface
//!
//! Argument definitions for the `unit-locator` binary.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use unit_locator::capture::Coordinate;

#[derive(Parser, Debug)]
#[command(name = "unit-locator", version)]
#[command(about = "Record fleet unit locations, online or offline")]
pub struct Cli {
    /// TOML configuration file; defaults plus environment overrides when omitted
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Capture a unit's location and submit it
    Record(RecordArgs),
    /// List captures waiting to be synced
    Queue,
    /// Replay the offline queue now
    Sync,
    /// Track connectivity and replay the queue on reconnect until Ctrl+C
    Watch,
}

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Unit (trailer) identifier
    #[arg(long)]
    pub unit: String,

    #[arg(long)]
    pub notes: Option<String>,

    /// JSON Lines file of position fixes to sample from
    #[arg(long, conflicts_with_all = ["lat", "lon"], required_unless_present = "lat")]
    pub fixes: Option<PathBuf>,

    /// Manual pin latitude
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    pub lat: Option<f64>,

    /// Manual pin longitude
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    pub lon: Option<f64>,
}

impl RecordArgs {
    /// The manually placed pin, if one was given
    pub fn manual_coordinate(&self) -> Option<Coordinate> {
        match (self.lat, self.lon) {
            (Some(latitude), Some(longitude)) => Some(Coordinate::new(latitude, longitude)),
            _ => None,
        }
    }
}
