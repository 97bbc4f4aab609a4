//! Occupancy library for parking availability aggregation
//!
//! This crate provides the core functionality for:
//! - Location identity derived from geography
//! - The uniform `Source` polling contract
//! - Multi-camera vision occupancy aggregation
//! - Polling sources into a registry keyed by identity
//! - Health checks and observability

pub mod error;
pub mod health;
pub mod identity;
pub mod models;
pub mod observability;
pub mod poller;
pub mod source;
pub mod topology;
pub mod vision;

pub use error::{
    CameraError, CaptureError, ClassifyError, ConfigError, FailureStage, SourceError,
};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use identity::LocationId;
pub use models::*;
pub use observability::{OccupancyMetrics, StructuredLogger};
pub use source::Source;
