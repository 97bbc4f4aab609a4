//! Registry of known locations
//!
//! Maintains the latest metadata and snapshot per location identity.

use crate::identity::LocationId;
use crate::models::{Metadata, Snapshot};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// Everything known about one location
#[derive(Debug, Clone, Default, Serialize)]
pub struct LocationEntry {
    /// Name of the source that last reported this location
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,
}

/// Registry of locations keyed by identity
#[derive(Debug, Default)]
pub struct LocationRegistry {
    locations: DashMap<LocationId, LocationEntry>,
}

impl LocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the metadata of every location in `metadata`.
    ///
    /// Each record overwrites the previous one for its id; locations missing
    /// from `metadata` are left untouched. Returns the number of records stored.
    pub fn update_metadata(&self, source: &str, metadata: HashMap<LocationId, Metadata>) -> usize {
        let count = metadata.len();
        for (id, record) in metadata {
            debug!(location_id = %id, source = %source, "Storing metadata");
            let mut entry = self.locations.entry(id).or_default();
            entry.source = source.to_string();
            entry.metadata = Some(record);
        }
        count
    }

    /// Store snapshots, ignoring any older than the one already held.
    /// Returns the number of snapshots stored.
    pub fn update_state(&self, source: &str, state: HashMap<LocationId, Snapshot>) -> usize {
        let mut stored = 0;
        for (id, snapshot) in state {
            let mut entry = self.locations.entry(id.clone()).or_default();
            let newer = entry
                .snapshot
                .as_ref()
                .map_or(true, |current| current.last_updated <= snapshot.last_updated);
            if !newer {
                debug!(location_id = %id, source = %source, "Ignoring out-of-date snapshot");
                continue;
            }
            if entry.metadata.is_none() {
                debug!(location_id = %id, source = %source, "Snapshot for location without metadata");
            }
            entry.source = source.to_string();
            entry.snapshot = Some(snapshot);
            stored += 1;
        }
        stored
    }

    pub fn get(&self, id: &LocationId) -> Option<LocationEntry> {
        self.locations.get(id).map(|r| r.clone())
    }

    pub fn metadata(&self, id: &LocationId) -> Option<Metadata> {
        self.locations.get(id).and_then(|r| r.metadata.clone())
    }

    pub fn snapshot(&self, id: &LocationId) -> Option<Snapshot> {
        self.locations.get(id).and_then(|r| r.snapshot.clone())
    }

    /// List all locations, ordered by identity
    pub fn list(&self) -> Vec<(LocationId, LocationEntry)> {
        let mut entries: Vec<_> = self
            .locations
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Number of locations with known metadata
    pub fn metadata_count(&self) -> usize {
        self.locations
            .iter()
            .filter(|r| r.metadata.is_some())
            .count()
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Geometry, SpotCounts, SpotType};
    use chrono::{Duration, Utc};
    use std::collections::BTreeMap;

    fn metadata(name: &str) -> Metadata {
        Metadata {
            name: name.to_string(),
            address: String::new(),
            geometry: Geometry::Point {
                latitude: 50.06,
                longitude: 19.94,
            },
            resources: vec![],
            total_spots: BTreeMap::new(),
            features: vec![],
            comment: BTreeMap::new(),
            currency: "PLN".to_string(),
            timezone: "Europe/Warsaw".to_string(),
        }
    }

    fn id() -> LocationId {
        LocationId::from_geometry(&metadata("x").geometry)
    }

    fn snapshot(age_secs: i64, cars: u32) -> Snapshot {
        let counts: SpotCounts = [(SpotType::Car, cars)].into_iter().collect();
        Snapshot::new(Utc::now() - Duration::seconds(age_secs), counts)
    }

    #[test]
    fn test_metadata_replaced_wholesale() {
        let registry = LocationRegistry::new();
        let mut first = metadata("Old name");
        first.comment.insert("en".to_string(), "Closed on Sundays".to_string());

        registry.update_metadata("vision", HashMap::from([(id(), first)]));
        registry.update_metadata("vision", HashMap::from([(id(), metadata("New name"))]));

        let stored = registry.metadata(&id()).unwrap();
        assert_eq!(stored.name, "New name");
        assert!(stored.comment.is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_metadata_and_state_share_entry() {
        let registry = LocationRegistry::new();
        registry.update_metadata("vision", HashMap::from([(id(), metadata("Lot"))]));
        registry.update_state("vision", HashMap::from([(id(), snapshot(0, 4))]));

        let entry = registry.get(&id()).unwrap();
        assert!(entry.metadata.is_some());
        assert_eq!(entry.snapshot.unwrap().available(SpotType::Car), 4);
        assert_eq!(registry.metadata_count(), 1);
    }

    #[test]
    fn test_older_snapshot_is_ignored() {
        let registry = LocationRegistry::new();
        assert_eq!(
            registry.update_state("vision", HashMap::from([(id(), snapshot(0, 4))])),
            1
        );
        assert_eq!(
            registry.update_state("vision", HashMap::from([(id(), snapshot(60, 9))])),
            0
        );

        assert_eq!(registry.snapshot(&id()).unwrap().available(SpotType::Car), 4);
    }

    #[test]
    fn test_snapshot_without_metadata_is_kept() {
        let registry = LocationRegistry::new();
        registry.update_state("vision", HashMap::from([(id(), snapshot(0, 1))]));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.metadata_count(), 0);
        assert!(registry.snapshot(&id()).is_some());
    }
}
