//! Source polling loop
//!
//! Refreshes metadata at start and every metadata interval, and polls state
//! every state interval plus jitter. Each state call gets a cancellation token
//! that fires after the state timeout, so sources return partial results
//! instead of blocking the loop.

use super::LocationRegistry;
use crate::health::{components, HealthRegistry};
use crate::observability::{OccupancyMetrics, StructuredLogger};
use crate::source::Source;
use anyhow::Result;
use futures::future::join_all;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Extra time a source gets to return after its state token fired
const STATE_GRACE: Duration = Duration::from_secs(5);

/// Configuration for the polling loop
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Interval between metadata refreshes (default: 1 hour)
    pub metadata_interval: Duration,
    /// Base interval between state polls (default: 60 seconds)
    pub state_interval: Duration,
    /// Budget for one state call (default: 30 seconds)
    pub state_timeout: Duration,
    /// Maximum jitter added to the state interval (default: 1 second)
    pub jitter: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            metadata_interval: Duration::from_secs(3600),
            state_interval: Duration::from_secs(60),
            state_timeout: Duration::from_secs(30),
            jitter: Duration::from_secs(1),
        }
    }
}

/// Results from one pass over all sources
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollResults {
    pub sources_ok: usize,
    pub sources_failed: usize,
    pub locations: usize,
}

/// Polls every source and merges results into the registry
pub struct Poller {
    sources: Vec<Arc<dyn Source>>,
    registry: Arc<LocationRegistry>,
    health: HealthRegistry,
    config: PollerConfig,
    metrics: OccupancyMetrics,
    logger: StructuredLogger,
}

impl Poller {
    pub fn new(
        sources: Vec<Arc<dyn Source>>,
        registry: Arc<LocationRegistry>,
        health: HealthRegistry,
        config: PollerConfig,
    ) -> Self {
        Self {
            sources,
            registry,
            health,
            config,
            metrics: OccupancyMetrics::new(),
            logger: StructuredLogger::new("poller"),
        }
    }

    pub fn registry(&self) -> &Arc<LocationRegistry> {
        &self.registry
    }

    /// Run until `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            sources = self.sources.len(),
            metadata_interval_secs = self.config.metadata_interval.as_secs(),
            state_interval_secs = self.config.state_interval.as_secs(),
            "Starting poller"
        );
        self.health.register(components::POLLER).await;

        // First tick completes immediately, so metadata is loaded before state
        let mut metadata_ticker = interval(self.config.metadata_interval);
        metadata_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let state_delay = sleep(Duration::ZERO);
        tokio::pin!(state_delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutting down poller");
                    break;
                }
                _ = metadata_ticker.tick() => {
                    self.refresh_metadata(&shutdown).await;
                }
                _ = &mut state_delay => {
                    let start = Instant::now();
                    let results = self.poll_state(&shutdown).await;
                    debug!(
                        sources_ok = results.sources_ok,
                        sources_failed = results.sources_failed,
                        locations = results.locations,
                        elapsed_ms = start.elapsed().as_millis(),
                        "State poll complete"
                    );
                    state_delay.as_mut().reset(Instant::now() + self.next_state_interval());
                }
            }
        }
    }

    fn next_state_interval(&self) -> Duration {
        let jitter_ms = rand_jitter(self.config.jitter.as_millis() as u64);
        self.config.state_interval + Duration::from_millis(jitter_ms)
    }

    /// Call `metadata` on every source and store the results
    pub async fn refresh_metadata(&self, shutdown: &CancellationToken) -> PollResults {
        let calls = self.sources.iter().map(|source| async move {
            (source.name().to_string(), source.metadata(shutdown).await)
        });

        let mut results = PollResults::default();
        for (name, result) in join_all(calls).await {
            match result {
                Ok(metadata) => {
                    let stored = self.registry.update_metadata(&name, metadata);
                    self.logger.log_metadata_refresh(&name, stored);
                    results.sources_ok += 1;
                    results.locations += stored;
                }
                Err(e) => {
                    self.logger
                        .log_source_failure(&name, "metadata", &e.to_string());
                    self.metrics.inc_source_errors(&name, "metadata");
                    results.sources_failed += 1;
                }
            }
        }

        let known = self.registry.metadata_count();
        self.metrics.set_locations_monitored(known as i64);
        self.health.set_metadata_loaded(known > 0).await;
        self.report_health(&results, "metadata").await;
        results
    }

    /// Call `state` on every source, each bounded by the state timeout
    pub async fn poll_state(&self, shutdown: &CancellationToken) -> PollResults {
        let calls = self.sources.iter().map(|source| async move {
            let name = source.name().to_string();
            let token = shutdown.child_token();
            let timer = tokio::spawn({
                let token = token.clone();
                let timeout = self.config.state_timeout;
                async move {
                    sleep(timeout).await;
                    token.cancel();
                }
            });

            let result = tokio::time::timeout(
                self.config.state_timeout + STATE_GRACE,
                source.state(&token),
            )
            .await;
            timer.abort();
            (name, result)
        });

        let mut results = PollResults::default();
        for (name, result) in join_all(calls).await {
            let error = match result {
                Ok(Ok(state)) => {
                    for (id, snapshot) in &state {
                        self.health.record_snapshot(id, snapshot.last_updated).await;
                    }
                    results.locations += self.registry.update_state(&name, state);
                    results.sources_ok += 1;
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => "source ignored cancellation".to_string(),
            };
            self.logger.log_source_failure(&name, "state", &error);
            self.metrics.inc_source_errors(&name, "state");
            results.sources_failed += 1;
        }

        self.report_health(&results, "state").await;
        results
    }

    async fn report_health(&self, results: &PollResults, call: &str) {
        if results.sources_failed == 0 {
            self.health.set_healthy(components::POLLER).await;
        } else if results.sources_ok > 0 {
            self.health
                .set_degraded(
                    components::POLLER,
                    format!("{} source {} calls failed", results.sources_failed, call),
                )
                .await;
        } else {
            warn!(call = %call, "Every source failed");
            self.health
                .set_unhealthy(components::POLLER, format!("all source {call} calls failed"))
                .await;
        }
    }
}

/// Random jitter between 0 and max_ms inclusive
fn rand_jitter(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..=max_ms)
}

/// Builder for creating the poller
pub struct PollerBuilder {
    sources: Vec<Arc<dyn Source>>,
    registry: Option<Arc<LocationRegistry>>,
    health: Option<HealthRegistry>,
    config: PollerConfig,
}

impl PollerBuilder {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            registry: None,
            health: None,
            config: PollerConfig::default(),
        }
    }

    /// Add a source to poll
    pub fn source(mut self, source: Arc<dyn Source>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn registry(mut self, registry: Arc<LocationRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn metadata_interval(mut self, interval: Duration) -> Self {
        self.config.metadata_interval = interval;
        self
    }

    pub fn state_interval(mut self, interval: Duration) -> Self {
        self.config.state_interval = interval;
        self
    }

    pub fn state_timeout(mut self, timeout: Duration) -> Self {
        self.config.state_timeout = timeout;
        self
    }

    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.config.jitter = jitter;
        self
    }

    /// Build the poller
    pub fn build(self) -> Result<Poller> {
        if self.sources.is_empty() {
            anyhow::bail!("At least one source is required");
        }
        let registry = self
            .registry
            .ok_or_else(|| anyhow::anyhow!("Registry is required"))?;
        if self.config.metadata_interval.is_zero() || self.config.state_interval.is_zero() {
            anyhow::bail!("Polling intervals must be positive");
        }

        Ok(Poller::new(
            self.sources,
            registry,
            self.health.unwrap_or_default(),
            self.config,
        ))
    }
}

impl Default for PollerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
