//! Identity CLI command

use anyhow::Result;
use colored::Colorize;
use occupancy_lib::{identity::COORDINATE_PRECISION, Coordinate, LocationId};
use serde::Serialize;

use crate::output::{print_json, OutputFormat};

#[derive(Serialize)]
struct IdentityReport {
    latitude: f64,
    longitude: f64,
    id: LocationId,
}

/// Print the identity of a coordinate
pub fn show_identity(latitude: f64, longitude: f64, format: OutputFormat) -> Result<()> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        anyhow::bail!("latitude must be within [-90, 90], got {latitude}");
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        anyhow::bail!("longitude must be within [-180, 180], got {longitude}");
    }

    let id = LocationId::from_coordinate(&Coordinate::new(latitude, longitude));

    match format {
        OutputFormat::Json => print_json(&IdentityReport {
            latitude,
            longitude,
            id,
        })?,
        OutputFormat::Table => {
            let precision = COORDINATE_PRECISION as usize;
            println!(
                "{}  {:.*}, {:.*}",
                "Coordinate:".bold(),
                precision,
                latitude,
                precision,
                longitude
            );
            println!("{}    {}", "Identity:".bold(), id.as_str().cyan());
        }
    }

    Ok(())
}
