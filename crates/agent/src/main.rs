//! Occupancy Agent - parking occupancy aggregation daemon
//!
//! Loads the camera topology and vacancy model, polls the vision source
//! on a fixed interval and exposes health and metrics endpoints.

use anyhow::{Context, Result};
use occupancy_agent::{api, config::AgentConfig};
use occupancy_lib::{
    health::{components, HealthRegistry},
    observability::StructuredLogger,
    poller::{LocationRegistry, PollerBuilder},
    topology::Topology,
    vision::{Aggregator, OnnxSpotClassifier, UrlFrameCapture, VisionSource},
    Source,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting occupancy-agent");

    let config = AgentConfig::load().context("Failed to load configuration")?;
    info!(
        agent_name = %config.agent_name,
        topology = %config.topology_path.display(),
        model = %config.model_path.display(),
        "Agent configured"
    );

    let health_registry = HealthRegistry::with_stale_after(config.stale_after());
    health_registry.register(components::CLASSIFIER).await;
    health_registry.register(components::CAPTURE).await;

    let logger = StructuredLogger::new(&config.agent_name);

    let topology = Topology::load(&config.topology_path).with_context(|| {
        format!("Failed to load topology {}", config.topology_path.display())
    })?;

    let classifier = OnnxSpotClassifier::from_file(&config.model_path, config.classifier_config())
        .with_context(|| format!("Failed to load model {}", config.model_path.display()))?;
    info!(model_version = %classifier.model_version(), "Classifier ready");

    let capture = UrlFrameCapture::new(config.camera_timeout())
        .context("Failed to create frame capture client")?
        .with_ffmpeg(&config.ffmpeg_path);

    let aggregator = Aggregator::new(
        Arc::new(capture),
        Arc::new(classifier),
        config.aggregator_config(),
    );
    let source: Arc<dyn Source> =
        Arc::new(VisionSource::new(topology, aggregator).with_health(health_registry.clone()));

    let registry = Arc::new(LocationRegistry::new());
    let poller = PollerBuilder::new()
        .source(source)
        .registry(registry)
        .health(health_registry.clone())
        .metadata_interval(config.metadata_interval())
        .state_interval(config.state_interval())
        .state_timeout(config.state_timeout())
        .build()?;

    logger.log_startup(AGENT_VERSION, 1);

    let app_state = Arc::new(api::AppState::new(health_registry.clone()));
    let shutdown = CancellationToken::new();

    let poller_handle = tokio::spawn(poller.run(shutdown.clone()));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state, shutdown.clone()));

    // Mark agent as ready after initialization; readiness also waits for metadata
    health_registry.set_ready(true).await;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;
    shutdown.cancel();

    if let Err(e) = poller_handle.await {
        warn!(error = %e, "Poller task failed");
    }
    match api_handle.await {
        Ok(Err(e)) => warn!(error = %e, "API server failed"),
        Err(e) => warn!(error = %e, "API server task failed"),
        Ok(Ok(())) => {}
    }

    info!("Shut down");
    Ok(())
}
