//! Uniform polling contract implemented by every data provider

use crate::error::SourceError;
use crate::identity::LocationId;
use crate::models::{Metadata, Snapshot};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

pub use async_trait::async_trait;

/// A provider of location metadata and occupancy state.
///
/// Both calls are idempotent and safe to repeat on a schedule. `metadata` is
/// all-or-nothing: on failure no partial mapping is returned. `state` returns
/// whatever locations it could observe and logs failures that are local to
/// one sub-unit (a camera, a vendor record).
#[async_trait]
pub trait Source: Send + Sync {
    /// Short name used in logs and metrics
    fn name(&self) -> &str;

    /// Static descriptive record for every known location
    async fn metadata(
        &self,
        cancel: &CancellationToken,
    ) -> Result<HashMap<LocationId, Metadata>, SourceError>;

    /// Fresh occupancy snapshot per known location
    async fn state(
        &self,
        cancel: &CancellationToken,
    ) -> Result<HashMap<LocationId, Snapshot>, SourceError>;
}
