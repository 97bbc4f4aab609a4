//! Local aggregation round command

use anyhow::{Context, Result};
use colored::Colorize;
use occupancy_lib::{
    topology::{Location, Topology},
    vision::{
        Aggregator, AggregatorConfig, CameraFailure, ClassifierConfig, OnnxSpotClassifier,
        UrlFrameCapture,
    },
    LocationId, SpotType,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tabled::Tabled;
use tokio_util::sync::CancellationToken;

use crate::output::{
    color_coverage, format_counts, print_json, print_table, print_warning, OutputFormat,
};

/// Options for `occ round`
pub struct RoundOptions {
    pub topology: PathBuf,
    pub model: PathBuf,
    pub model_sha256: Option<String>,
    pub input_size: u32,
    pub location: Option<String>,
    pub camera_timeout: u64,
    pub round_timeout: u64,
    pub ffmpeg: PathBuf,
}

/// Round result of one location
#[derive(Serialize)]
struct RoundReport {
    id: LocationId,
    name: String,
    available_spots: BTreeMap<SpotType, u32>,
    last_updated: String,
    cameras_total: usize,
    cameras_succeeded: usize,
    coverage: f64,
    duration_ms: u64,
    failures: Vec<CameraFailure>,
}

/// Row for the round results table
#[derive(Tabled)]
struct RoundRow {
    #[tabled(rename = "Location")]
    name: String,
    #[tabled(rename = "Available")]
    available: String,
    #[tabled(rename = "Cameras")]
    coverage: String,
    #[tabled(rename = "Duration")]
    duration: String,
}

/// Run one aggregation round per selected location
pub async fn run_round(options: RoundOptions, format: OutputFormat) -> Result<()> {
    let topology = Topology::load(&options.topology)
        .with_context(|| format!("Invalid topology {}", options.topology.display()))?;

    let locations: Vec<Location> = match &options.location {
        Some(name) => {
            let selected: Vec<Location> = topology
                .into_locations()
                .into_iter()
                .filter(|l| l.name() == name)
                .collect();
            if selected.is_empty() {
                anyhow::bail!("No location named {:?} in {}", name, options.topology.display());
            }
            selected
        }
        None => topology.into_locations(),
    };

    let classifier_config = ClassifierConfig {
        input_width: options.input_size,
        input_height: options.input_size,
        expected_sha256: options.model_sha256.clone(),
    };
    let classifier = OnnxSpotClassifier::from_file(&options.model, classifier_config)
        .with_context(|| format!("Failed to load model {}", options.model.display()))?;

    let camera_timeout = Duration::from_secs(options.camera_timeout);
    let capture = UrlFrameCapture::new(camera_timeout)
        .context("Failed to create frame capture client")?
        .with_ffmpeg(&options.ffmpeg);
    let aggregator = Aggregator::new(
        Arc::new(capture),
        Arc::new(classifier),
        AggregatorConfig {
            camera_timeout,
            round_timeout: Duration::from_secs(options.round_timeout),
        },
    );

    let cancel = CancellationToken::new();
    let mut outcomes = Vec::with_capacity(locations.len());
    for location in &locations {
        outcomes.push(aggregator.run_round(location, &cancel).await);
    }

    let reports: Vec<RoundReport> = locations
        .iter()
        .zip(outcomes)
        .map(|(location, outcome)| RoundReport {
            id: location.id.clone(),
            name: location.name().to_string(),
            coverage: outcome.coverage(),
            available_spots: outcome.snapshot.available_spots,
            last_updated: outcome.snapshot.last_updated.to_rfc3339(),
            cameras_total: outcome.cameras_total,
            cameras_succeeded: outcome.cameras_succeeded,
            duration_ms: outcome.duration.as_millis() as u64,
            failures: outcome.failures,
        })
        .collect();

    match format {
        OutputFormat::Json => print_json(&reports)?,
        OutputFormat::Table => {
            for report in &reports {
                for failure in &report.failures {
                    print_warning(&format!(
                        "{} camera #{} ({}): {}",
                        report.name, failure.camera, failure.url, failure.error
                    ));
                }
            }

            let rows: Vec<RoundRow> = reports
                .iter()
                .map(|r| RoundRow {
                    name: r.name.clone(),
                    available: format_counts(&r.available_spots),
                    coverage: color_coverage(r.cameras_succeeded, r.cameras_total),
                    duration: format!("{}ms", r.duration_ms),
                })
                .collect();
            print_table(rows);

            if reports.iter().any(|r| r.cameras_succeeded < r.cameras_total) {
                println!(
                    "{}",
                    "Counts of locations with failed cameras are a lower bound".dimmed()
                );
            }
        }
    }

    Ok(())
}
