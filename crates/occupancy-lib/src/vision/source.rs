//! `Source` implementation over a camera topology

use super::{Aggregator, RoundOutcome};
use crate::error::{FailureStage, SourceError};
use crate::health::{components, HealthRegistry};
use crate::identity::LocationId;
use crate::models::{Metadata, Snapshot};
use crate::observability::{OccupancyMetrics, StructuredLogger};
use crate::source::Source;
use crate::topology::{Location, Topology};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::info;

const SOURCE_NAME: &str = "vision";

/// Occupancy source backed by parking cameras
pub struct VisionSource {
    locations: Vec<Location>,
    aggregator: Aggregator,
    metrics: OccupancyMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl VisionSource {
    /// Build a source from a validated topology
    pub fn new(topology: Topology, aggregator: Aggregator) -> Self {
        let locations = topology.into_locations();
        let metrics = OccupancyMetrics::new();
        metrics.set_cameras_configured(locations.iter().map(|l| l.cameras.len() as i64).sum());

        info!(
            locations = locations.len(),
            cameras = locations.iter().map(|l| l.cameras.len()).sum::<usize>(),
            "Vision source configured"
        );

        Self {
            locations,
            aggregator,
            metrics,
            logger: StructuredLogger::new(SOURCE_NAME),
            health: None,
        }
    }

    /// Report capture and classifier health after every round
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    /// Run one round per location concurrently, returning full outcomes
    pub async fn run_rounds(&self, cancel: &CancellationToken) -> Vec<(LocationId, RoundOutcome)> {
        let rounds = self.locations.iter().map(|location| async move {
            let outcome = self.aggregator.run_round(location, cancel).await;
            self.record(location, &outcome);
            (location.id.clone(), outcome)
        });
        let outcomes = join_all(rounds).await;
        if let Some(health) = &self.health {
            report_health(health, &outcomes).await;
        }
        outcomes
    }

    fn record(&self, location: &Location, outcome: &RoundOutcome) {
        self.metrics
            .observe_round_latency(outcome.duration.as_secs_f64());
        self.metrics.inc_rounds_completed();
        self.metrics
            .set_camera_coverage(location.id.as_str(), outcome.coverage());
        for failure in &outcome.failures {
            self.metrics.inc_camera_failures();
            self.logger
                .log_camera_failure(location.name(), failure.camera, &failure.url, &failure.error);
        }
        self.logger.log_round(
            location.id.as_str(),
            location.name(),
            outcome.cameras_succeeded,
            outcome.cameras_total,
            outcome.snapshot.available_spots.values().sum(),
            outcome.duration.as_millis() as u64,
        );
    }
}

/// Capture is unhealthy when no camera delivered a frame; any failure at a
/// stage degrades the matching component.
async fn report_health(health: &HealthRegistry, outcomes: &[(LocationId, RoundOutcome)]) {
    let cameras: usize = outcomes.iter().map(|(_, o)| o.cameras_total).sum();
    let failed_at = |stage: FailureStage| {
        outcomes
            .iter()
            .flat_map(|(_, o)| &o.failures)
            .filter(|f| f.stage == stage)
            .count()
    };
    let capture_failures = failed_at(FailureStage::Capture);
    let classify_failures = failed_at(FailureStage::Classification);

    if cameras > 0 && capture_failures == cameras {
        health
            .set_unhealthy(components::CAPTURE, "no camera delivered a frame")
            .await;
    } else if capture_failures > 0 {
        health
            .set_degraded(
                components::CAPTURE,
                format!("{capture_failures} of {cameras} cameras failed to deliver a frame"),
            )
            .await;
    } else {
        health.set_healthy(components::CAPTURE).await;
    }

    if classify_failures > 0 {
        health
            .set_degraded(
                components::CLASSIFIER,
                format!("classification failed for {classify_failures} camera(s)"),
            )
            .await;
    } else {
        health.set_healthy(components::CLASSIFIER).await;
    }
}

#[async_trait]
impl Source for VisionSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn metadata(
        &self,
        cancel: &CancellationToken,
    ) -> Result<HashMap<LocationId, Metadata>, SourceError> {
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }
        Ok(self
            .locations
            .iter()
            .map(|location| (location.id.clone(), location.metadata.clone()))
            .collect())
    }

    async fn state(
        &self,
        cancel: &CancellationToken,
    ) -> Result<HashMap<LocationId, Snapshot>, SourceError> {
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }
        Ok(self
            .run_rounds(cancel)
            .await
            .into_iter()
            .map(|(id, outcome)| (id, outcome.snapshot))
            .collect())
    }
}
