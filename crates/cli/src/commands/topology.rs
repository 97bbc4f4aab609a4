//! Topology CLI commands

use anyhow::{Context, Result};
use occupancy_lib::topology::Topology;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use tabled::Tabled;

use crate::output::{print_json, print_success, print_table, OutputFormat};

/// Row for the locations table
#[derive(Tabled, Serialize)]
struct LocationRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Cameras")]
    cameras: usize,
    #[tabled(rename = "Regions")]
    regions: usize,
    #[tabled(rename = "Spot Types")]
    spot_types: String,
}

/// Validate a topology file and list its locations
pub fn validate_topology(path: &Path, format: OutputFormat) -> Result<()> {
    let topology = Topology::load(path)
        .with_context(|| format!("Invalid topology {}", path.display()))?;

    let rows: Vec<LocationRow> = topology
        .locations()
        .iter()
        .map(|location| {
            let spot_types: BTreeSet<_> = location
                .cameras
                .iter()
                .flat_map(|c| c.spots.iter().map(|s| s.spot_type))
                .collect();
            LocationRow {
                name: location.name().to_string(),
                id: location.id.to_string(),
                cameras: location.cameras.len(),
                regions: location.spot_count(),
                spot_types: spot_types
                    .iter()
                    .map(|t| t.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            }
        })
        .collect();

    match format {
        OutputFormat::Json => print_json(&rows)?,
        OutputFormat::Table => {
            let count = rows.len();
            print_table(rows);
            print_success(&format!(
                "{} is valid: {} location(s)",
                path.display(),
                count
            ));
        }
    }

    Ok(())
}
