//! Core data models shared by every source

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// Kind of parking spot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum SpotType {
    #[serde(alias = "car")]
    Car,
    #[serde(alias = "car-handicap", alias = "CAR-DISABLED", alias = "car-disabled")]
    CarHandicap,
    #[serde(alias = "car-electric")]
    CarElectric,
    #[serde(alias = "motorcycle")]
    Motorcycle,
}

impl SpotType {
    /// Spot type every snapshot must carry, even with a zero count
    pub const BASELINE: SpotType = SpotType::Car;

    pub const ALL: [SpotType; 4] = [
        SpotType::Car,
        SpotType::CarHandicap,
        SpotType::CarElectric,
        SpotType::Motorcycle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpotType::Car => "CAR",
            SpotType::CarHandicap => "CAR-HANDICAP",
            SpotType::CarElectric => "CAR-ELECTRIC",
            SpotType::Motorcycle => "MOTORCYCLE",
        }
    }
}

impl Default for SpotType {
    fn default() -> Self {
        Self::BASELINE
    }
}

impl fmt::Display for SpotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// WGS84 coordinate in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Geographic extent of a location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Geometry {
    Point {
        latitude: f64,
        longitude: f64,
    },
    Polygon {
        points: Vec<Coordinate>,
    },
}

impl Geometry {
    /// Representative coordinate: the point itself, or the centroid of the
    /// polygon's distinct vertices.
    pub fn centroid(&self) -> Coordinate {
        match self {
            Geometry::Point {
                latitude,
                longitude,
            } => Coordinate::new(*latitude, *longitude),
            Geometry::Polygon { points } => {
                let vertices = match (points.first(), points.last()) {
                    (Some(first), Some(last)) if points.len() > 1 && first == last => {
                        &points[..points.len() - 1]
                    }
                    _ => &points[..],
                };
                if vertices.is_empty() {
                    return Coordinate::new(0.0, 0.0);
                }
                let n = vertices.len() as f64;
                let (lat, lon) = vertices
                    .iter()
                    .fold((0.0, 0.0), |(lat, lon), c| (lat + c.latitude, lon + c.longitude));
                Coordinate::new(lat / n, lon / n)
            }
        }
    }
}

/// Physical characteristics of a location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum Feature {
    Uncovered,
    Covered,
    Underground,
}

/// Static descriptive record of a location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Metadata {
    pub name: String,
    pub address: String,
    pub geometry: Geometry,
    #[serde(default)]
    pub resources: Vec<Url>,
    #[serde(default)]
    pub total_spots: BTreeMap<SpotType, u32>,
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub comment: BTreeMap<String, String>,
    pub currency: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// Vacant spot counts keyed by spot type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpotCounts(BTreeMap<SpotType, u32>);

impl SpotCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `spot_type` present without changing its count
    pub fn observe(&mut self, spot_type: SpotType) {
        self.0.entry(spot_type).or_insert(0);
    }

    /// Count one more vacant spot of `spot_type`
    pub fn increment(&mut self, spot_type: SpotType) {
        *self.0.entry(spot_type).or_insert(0) += 1;
    }

    /// Sum another partial result into this one
    pub fn merge(&mut self, other: &SpotCounts) {
        for (spot_type, count) in &other.0 {
            *self.0.entry(*spot_type).or_insert(0) += count;
        }
    }

    pub fn get(&self, spot_type: SpotType) -> Option<u32> {
        self.0.get(&spot_type).copied()
    }

    pub fn total(&self) -> u32 {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SpotType, u32)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }
}

impl FromIterator<(SpotType, u32)> for SpotCounts {
    fn from_iter<I: IntoIterator<Item = (SpotType, u32)>>(iter: I) -> Self {
        let mut counts = SpotCounts::new();
        for (spot_type, count) in iter {
            *counts.0.entry(spot_type).or_insert(0) += count;
        }
        counts
    }
}

/// Occupancy of one location at one capture instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Snapshot {
    pub last_updated: DateTime<Utc>,
    pub available_spots: BTreeMap<SpotType, u32>,
}

impl Snapshot {
    /// Build a snapshot, always including the baseline spot type
    pub fn new(last_updated: DateTime<Utc>, counts: SpotCounts) -> Self {
        let mut available_spots = counts.0;
        available_spots.entry(SpotType::BASELINE).or_insert(0);
        Self {
            last_updated,
            available_spots,
        }
    }

    pub fn available(&self, spot_type: SpotType) -> u32 {
        self.available_spots.get(&spot_type).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_inserts_baseline() {
        let snapshot = Snapshot::new(Utc::now(), SpotCounts::new());
        assert_eq!(snapshot.available_spots.len(), 1);
        assert_eq!(snapshot.available_spots[&SpotType::Car], 0);
    }

    #[test]
    fn test_snapshot_keeps_existing_baseline() {
        let counts: SpotCounts = [(SpotType::Car, 3), (SpotType::Motorcycle, 1)]
            .into_iter()
            .collect();
        let snapshot = Snapshot::new(Utc::now(), counts);
        assert_eq!(snapshot.available(SpotType::Car), 3);
        assert_eq!(snapshot.available(SpotType::Motorcycle), 1);
        assert_eq!(snapshot.available_spots.len(), 2);
    }

    #[test]
    fn test_spot_counts_merge_is_order_independent() {
        let a: SpotCounts = [(SpotType::Car, 1), (SpotType::CarHandicap, 1)]
            .into_iter()
            .collect();
        let b: SpotCounts = [(SpotType::Car, 2)].into_iter().collect();
        let c: SpotCounts = [(SpotType::CarElectric, 4)].into_iter().collect();

        let mut left = a.clone();
        left.merge(&b);
        left.merge(&c);

        let mut right = c.clone();
        right.merge(&a);
        right.merge(&b);

        assert_eq!(left, right);
        assert_eq!(left.get(SpotType::Car), Some(3));
        assert_eq!(left.total(), 8);
    }

    #[test]
    fn test_observe_adds_zero_entry() {
        let mut counts = SpotCounts::new();
        counts.observe(SpotType::CarHandicap);
        assert_eq!(counts.get(SpotType::CarHandicap), Some(0));
        counts.increment(SpotType::CarHandicap);
        counts.observe(SpotType::CarHandicap);
        assert_eq!(counts.get(SpotType::CarHandicap), Some(1));
    }

    #[test]
    fn test_snapshot_serialization_format() {
        let counts: SpotCounts = [(SpotType::CarHandicap, 2)].into_iter().collect();
        let snapshot = Snapshot::new(Utc::now(), counts);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["available-spots"]["CAR"], 0);
        assert_eq!(json["available-spots"]["CAR-HANDICAP"], 2);
        assert!(json["last-updated"].is_string());
    }

    #[test]
    fn test_spot_type_wire_names() {
        for spot_type in SpotType::ALL {
            let json = serde_json::to_string(&spot_type).unwrap();
            assert_eq!(json, format!("\"{}\"", spot_type.as_str()));
            let back: SpotType = serde_json::from_str(&json).unwrap();
            assert_eq!(back, spot_type);
        }
        assert_eq!(
            serde_json::to_string(&SpotType::CarHandicap).unwrap(),
            "\"CAR-HANDICAP\""
        );
        let legacy: SpotType = serde_json::from_str("\"CAR-DISABLED\"").unwrap();
        assert_eq!(legacy, SpotType::CarHandicap);
    }

    #[test]
    fn test_polygon_centroid_ignores_closing_vertex() {
        let open = Geometry::Polygon {
            points: vec![
                Coordinate::new(0.0, 0.0),
                Coordinate::new(0.0, 2.0),
                Coordinate::new(2.0, 2.0),
                Coordinate::new(2.0, 0.0),
            ],
        };
        let closed = Geometry::Polygon {
            points: vec![
                Coordinate::new(0.0, 0.0),
                Coordinate::new(0.0, 2.0),
                Coordinate::new(2.0, 2.0),
                Coordinate::new(2.0, 0.0),
                Coordinate::new(0.0, 0.0),
            ],
        };
        assert_eq!(open.centroid(), Coordinate::new(1.0, 1.0));
        assert_eq!(closed.centroid(), Coordinate::new(1.0, 1.0));
    }

    #[test]
    fn test_spot_type_display_matches_serde() {
        for spot_type in SpotType::ALL {
            let json = serde_json::to_value(spot_type).unwrap();
            assert_eq!(json, spot_type.to_string());
        }
    }
}
