//! Aggregation round across all cameras of one location
//!
//! One task per camera is spawned and joined before the round completes.
//! Workers report their partial counts over a channel to a single combining
//! loop, so no counter is shared between tasks. A failing camera is logged
//! and contributes nothing; it never cancels its siblings.

use super::{CameraWorker, FrameCapture, SpotClassifier};
use crate::error::{CameraError, FailureStage};
use crate::models::{Snapshot, SpotCounts};
use crate::topology::Location;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Configuration for aggregation rounds
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Maximum time one camera may take (default: 10 seconds)
    pub camera_timeout: Duration,
    /// Maximum time a whole round may take (default: 30 seconds)
    pub round_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            camera_timeout: Duration::from_secs(10),
            round_timeout: Duration::from_secs(30),
        }
    }
}

/// A camera that did not contribute to a round
#[derive(Debug, Clone, Serialize)]
pub struct CameraFailure {
    pub camera: usize,
    pub url: String,
    pub stage: FailureStage,
    pub error: String,
}

/// Result of one round: the snapshot plus how many cameras it covers.
///
/// Failed cameras count as zero, so the snapshot is a lower bound whenever
/// `cameras_succeeded < cameras_total`.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    pub snapshot: Snapshot,
    pub cameras_total: usize,
    pub cameras_succeeded: usize,
    pub failures: Vec<CameraFailure>,
    pub duration: Duration,
}

impl RoundOutcome {
    /// Fraction of cameras that contributed; 1.0 for a location without cameras
    pub fn coverage(&self) -> f64 {
        if self.cameras_total == 0 {
            1.0
        } else {
            self.cameras_succeeded as f64 / self.cameras_total as f64
        }
    }

    pub fn is_complete(&self) -> bool {
        self.cameras_succeeded == self.cameras_total
    }
}

/// Message from a camera task to the combining loop
struct CameraReport {
    slot: usize,
    result: Result<SpotCounts, CameraError>,
}

/// Runs aggregation rounds
#[derive(Clone)]
pub struct Aggregator {
    worker: Arc<CameraWorker>,
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(
        capture: Arc<dyn FrameCapture>,
        classifier: Arc<dyn SpotClassifier>,
        config: AggregatorConfig,
    ) -> Self {
        Self {
            worker: Arc::new(CameraWorker::new(capture, classifier)),
            config,
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Produce one snapshot for the location. Never fails: cameras that fail,
    /// time out or are abandoned on cancellation simply contribute nothing.
    pub async fn aggregate(&self, location: &Location, cancel: &CancellationToken) -> Snapshot {
        self.run_round(location, cancel).await.snapshot
    }

    /// Like `aggregate`, also reporting per-camera coverage
    pub async fn run_round(&self, location: &Location, cancel: &CancellationToken) -> RoundOutcome {
        let captured_at = Utc::now();
        let started = Instant::now();
        let cameras = &location.cameras;

        let round_cancel = cancel.child_token();
        let (report_tx, mut report_rx) = mpsc::channel::<CameraReport>(cameras.len().max(1));
        let mut tasks = JoinSet::new();

        for (slot, camera) in cameras.iter().enumerate() {
            let worker = Arc::clone(&self.worker);
            let camera = camera.clone();
            let token = round_cancel.child_token();
            let timeout = self.config.camera_timeout;
            let report_tx = report_tx.clone();

            tasks.spawn(async move {
                let result = match tokio::time::timeout(timeout, worker.process(&camera, &token)).await
                {
                    Ok(result) => result,
                    Err(_) => {
                        token.cancel();
                        Err(CameraError::Timeout(timeout))
                    }
                };
                // Receiver is gone only when the round was abandoned
                let _ = report_tx.send(CameraReport { slot, result }).await;
            });
        }
        drop(report_tx);

        let mut counts = SpotCounts::new();
        let mut reported = vec![false; cameras.len()];
        let mut succeeded = 0usize;
        let mut failures = Vec::new();

        let mut record = |CameraReport { slot, result }: CameraReport| {
            reported[slot] = true;
            let camera = &cameras[slot];
            match result {
                Ok(partial) => {
                    counts.merge(&partial);
                    succeeded += 1;
                }
                Err(e) => {
                    debug!(
                        location = %location.name(),
                        camera = camera.index,
                        error = %e,
                        "Processing camera failed"
                    );
                    failures.push(CameraFailure {
                        camera: camera.index,
                        url: camera.url.to_string(),
                        stage: e.stage(),
                        error: e.to_string(),
                    });
                }
            }
        };

        let deadline = tokio::time::sleep(self.config.round_timeout);
        tokio::pin!(deadline);

        // Delivered reports are taken before cancellation or the deadline
        let interrupted = loop {
            tokio::select! {
                biased;
                report = report_rx.recv() => match report {
                    Some(report) => record(report),
                    None => break None,
                },
                _ = round_cancel.cancelled() => break Some(CameraError::Cancelled),
                _ = &mut deadline => break Some(CameraError::Timeout(self.config.round_timeout)),
            }
        };
        while let Ok(report) = report_rx.try_recv() {
            record(report);
        }

        // Abandoned workers never contribute
        round_cancel.cancel();
        tasks.abort_all();

        for (slot, camera) in cameras.iter().enumerate() {
            if reported[slot] {
                continue;
            }
            let reason = match &interrupted {
                Some(CameraError::Cancelled) => CameraError::Cancelled,
                Some(_) => CameraError::Timeout(self.config.round_timeout),
                None => CameraError::Worker("exited without reporting".to_string()),
            };
            let error = reason.to_string();
            debug!(
                location = %location.name(),
                camera = camera.index,
                error = %error,
                "Camera abandoned"
            );
            failures.push(CameraFailure {
                camera: camera.index,
                url: camera.url.to_string(),
                stage: reason.stage(),
                error,
            });
        }

        let duration = started.elapsed();
        debug!(
            location = %location.name(),
            cameras = cameras.len(),
            succeeded = succeeded,
            elapsed_ms = duration.as_millis(),
            "Finished processing cameras"
        );

        RoundOutcome {
            snapshot: Snapshot::new(captured_at, counts),
            cameras_total: cameras.len(),
            cameras_succeeded: succeeded,
            failures,
            duration,
        }
    }
}
