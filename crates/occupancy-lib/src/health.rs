//! Health check infrastructure for the occupancy agent
//!
//! Tracks component health, readiness and the age of each location's latest
//! snapshot for liveness and readiness probes.

use crate::identity::LocationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Default age after which a location's snapshot is considered stale
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(300);

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component is functioning normally
    Healthy,
    /// Component is experiencing issues but still operational
    Degraded,
    /// Component has failed
    Unhealthy,
}

impl ComponentStatus {
    /// Returns true if the component is at least partially operational
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

/// Information about a component's health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::with_status(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Location whose latest snapshot is older than the staleness bound
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleLocation {
    pub id: LocationId,
    pub last_updated: DateTime<Utc>,
    pub age_secs: i64,
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stale_locations: Vec<StaleLocation>,
}

impl HealthResponse {
    /// Compute overall status from component statuses
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        let mut has_degraded = false;

        for health in components.values() {
            match health.status {
                ComponentStatus::Unhealthy => return ComponentStatus::Unhealthy,
                ComponentStatus::Degraded => has_degraded = true,
                ComponentStatus::Healthy => {}
            }
        }

        if has_degraded {
            ComponentStatus::Degraded
        } else {
            ComponentStatus::Healthy
        }
    }
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const POLLER: &str = "poller";
    pub const CLASSIFIER: &str = "classifier";
    pub const CAPTURE: &str = "capture";
}

/// Health registry for tracking component health and snapshot freshness
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    snapshots: Arc<RwLock<HashMap<LocationId, DateTime<Utc>>>>,
    ready: Arc<RwLock<bool>>,
    metadata_loaded: Arc<RwLock<bool>>,
    stale_after: Duration,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::with_stale_after(DEFAULT_STALE_AFTER)
    }

    /// Registry reporting locations whose snapshot is older than `stale_after`
    pub fn with_stale_after(stale_after: Duration) -> Self {
        Self {
            components: Arc::new(RwLock::new(HashMap::new())),
            snapshots: Arc::new(RwLock::new(HashMap::new())),
            ready: Arc::new(RwLock::new(false)),
            metadata_loaded: Arc::new(RwLock::new(false)),
            stale_after,
        }
    }

    /// Register a component with initial healthy status
    pub async fn register(&self, name: &str) {
        let mut components = self.components.write().await;
        components.insert(name.to_string(), ComponentHealth::healthy());
    }

    /// Update component health status
    pub async fn update(&self, name: &str, health: ComponentHealth) {
        let mut components = self.components.write().await;
        components.insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    /// Set readiness status
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Record whether metadata for at least one location is known
    pub async fn set_metadata_loaded(&self, loaded: bool) {
        *self.metadata_loaded.write().await = loaded;
    }

    /// Remember the timestamp of a location's latest snapshot
    pub async fn record_snapshot(&self, id: &LocationId, last_updated: DateTime<Utc>) {
        let mut snapshots = self.snapshots.write().await;
        let entry = snapshots.entry(id.clone()).or_insert(last_updated);
        if *entry < last_updated {
            *entry = last_updated;
        }
    }

    /// Locations whose latest snapshot is older than the staleness bound at `now`
    pub async fn stale_locations(&self, now: DateTime<Utc>) -> Vec<StaleLocation> {
        let bound = self.stale_after.as_secs() as i64;
        let snapshots = self.snapshots.read().await;
        let mut stale: Vec<StaleLocation> = snapshots
            .iter()
            .filter_map(|(id, last_updated)| {
                let age_secs = (now - *last_updated).num_seconds();
                (age_secs > bound).then(|| StaleLocation {
                    id: id.clone(),
                    last_updated: *last_updated,
                    age_secs,
                })
            })
            .collect();
        stale.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        stale
    }

    /// Get health response; stale locations degrade an otherwise healthy agent
    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let stale_locations = self.stale_locations(Utc::now()).await;

        let mut status = HealthResponse::compute_status(&components);
        if status == ComponentStatus::Healthy && !stale_locations.is_empty() {
            status = ComponentStatus::Degraded;
        }

        HealthResponse {
            status,
            components,
            stale_locations,
        }
    }

    /// Get readiness response
    pub async fn readiness(&self) -> ReadinessResponse {
        let ready = *self.ready.read().await;
        let metadata_loaded = *self.metadata_loaded.read().await;
        let components = self.components.read().await;
        let critical_healthy =
            HealthResponse::compute_status(&components) != ComponentStatus::Unhealthy;

        let reason = if !ready {
            Some("Agent not yet initialized")
        } else if !critical_healthy {
            Some("Critical component unhealthy")
        } else if !metadata_loaded {
            Some("Location metadata not yet loaded")
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason: reason.map(str::to_string),
        }
    }
}
