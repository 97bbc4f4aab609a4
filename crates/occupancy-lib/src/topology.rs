//! Static camera topology
//!
//! Per-location camera addresses and ordered spot regions, loaded once when a
//! vision source is built and read-only afterwards. Any problem here is a
//! configuration error and the source cannot be created.

use crate::error::ConfigError;
use crate::identity::LocationId;
use crate::models::{Feature, Geometry, Metadata, SpotType};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use url::Url;

/// Raw topology file contents
#[derive(Debug, Clone, Deserialize)]
pub struct TopologyConfig {
    #[serde(default)]
    pub locations: Vec<LocationConfig>,
}

/// One location as written in the topology file
#[derive(Debug, Clone, Deserialize)]
pub struct LocationConfig {
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub geometry: Geometry,
    #[serde(default)]
    pub resources: Vec<Url>,
    #[serde(default)]
    pub total_spots: BTreeMap<SpotType, u32>,
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub comment: BTreeMap<String, String>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub cameras: Vec<CameraConfig>,
}

/// One camera as written in the topology file
#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    pub url: String,
    #[serde(default)]
    pub spots: Vec<SpotRegion>,
}

fn default_currency() -> String {
    "EUR".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// Rectangle of a camera frame covering one parking spot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SpotRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    #[serde(default, rename = "type")]
    pub spot_type: SpotType,
}

impl SpotRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32, spot_type: SpotType) -> Self {
        Self {
            x,
            y,
            width,
            height,
            spot_type,
        }
    }
}

/// A validated camera
#[derive(Debug, Clone)]
pub struct Camera {
    /// Position of the camera within its location
    pub index: usize,
    pub url: Url,
    pub spots: Vec<SpotRegion>,
}

/// A validated location with its identity computed
#[derive(Debug, Clone)]
pub struct Location {
    pub id: LocationId,
    pub metadata: Metadata,
    pub cameras: Vec<Camera>,
}

impl Location {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn spot_count(&self) -> usize {
        self.cameras.iter().map(|c| c.spots.len()).sum()
    }
}

/// Validated topology
#[derive(Debug, Clone)]
pub struct Topology {
    locations: Vec<Location>,
}

impl Topology {
    /// Load a topology file; the format follows the extension (toml, yaml, json)
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .build()?
            .try_deserialize::<TopologyConfig>()?;
        Self::from_config(config)
    }

    /// Parse topology from a string in the given format
    pub fn parse(content: &str, format: config::FileFormat) -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(content, format))
            .build()?
            .try_deserialize::<TopologyConfig>()?;
        Self::from_config(config)
    }

    /// Validate raw configuration and compute identities
    pub fn from_config(config: TopologyConfig) -> Result<Self, ConfigError> {
        if config.locations.is_empty() {
            return Err(ConfigError::NoLocations);
        }

        let mut seen: HashMap<LocationId, String> = HashMap::new();
        let mut locations = Vec::with_capacity(config.locations.len());

        for (index, raw) in config.locations.into_iter().enumerate() {
            let location = validate_location(index, raw)?;
            if let Some(first) = seen.get(&location.id) {
                return Err(ConfigError::DuplicateIdentity {
                    first: first.clone(),
                    second: location.metadata.name.clone(),
                    id: location.id.to_string(),
                });
            }
            seen.insert(location.id.clone(), location.metadata.name.clone());
            locations.push(location);
        }

        Ok(Self { locations })
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn into_locations(self) -> Vec<Location> {
        self.locations
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

fn validate_location(index: usize, raw: LocationConfig) -> Result<Location, ConfigError> {
    let name = raw.name.trim().to_string();
    if name.is_empty() {
        return Err(ConfigError::EmptyName { index });
    }
    if raw.cameras.is_empty() {
        return Err(ConfigError::NoCameras { location: name });
    }
    if let Geometry::Polygon { points } = &raw.geometry {
        if points.len() < 3 {
            return Err(ConfigError::DegeneratePolygon {
                location: name,
                vertices: points.len(),
            });
        }
    }

    let mut cameras = Vec::with_capacity(raw.cameras.len());
    for (camera_index, camera) in raw.cameras.into_iter().enumerate() {
        let url = Url::parse(&camera.url).map_err(|source| ConfigError::InvalidUrl {
            location: name.clone(),
            camera: camera_index,
            url: camera.url.clone(),
            source,
        })?;
        if let Some(spot) = camera
            .spots
            .iter()
            .position(|s| s.width == 0 || s.height == 0)
        {
            return Err(ConfigError::EmptyRegion {
                location: name,
                camera: camera_index,
                spot,
            });
        }
        cameras.push(Camera {
            index: camera_index,
            url,
            spots: camera.spots,
        });
    }

    let id = LocationId::from_geometry(&raw.geometry);
    let metadata = Metadata {
        name,
        address: raw.address,
        geometry: raw.geometry,
        resources: raw.resources,
        total_spots: raw.total_spots,
        features: raw.features,
        comment: raw.comment,
        currency: raw.currency,
        timezone: raw.timezone,
    };

    Ok(Location {
        id,
        metadata,
        cameras,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    const SAMPLE: &str = r#"
[[locations]]
name = "Galeria Krakowska"
address = "Pawia 5, 31-154 Krakow"
currency = "PLN"
timezone = "Europe/Warsaw"
features = ["COVERED"]
total_spots = { CAR = 40, CAR-HANDICAP = 2 }
geometry = { type = "point", latitude = 50.0677, longitude = 19.9455 }

[[locations.cameras]]
url = "http://camera-1.local/snapshot.jpg"
spots = [
    { x = 10, y = 20, width = 64, height = 48, type = "CAR" },
    { x = 80, y = 20, width = 64, height = 48, type = "CAR-HANDICAP" },
]

[[locations.cameras]]
url = "file:///var/lib/occupancy/camera-2.jpg"
spots = [ { x = 0, y = 0, width = 32, height = 32 } ]
"#;

    #[test]
    fn test_load_sample_topology() {
        let topology = Topology::parse(SAMPLE, FileFormat::Toml).unwrap();
        assert_eq!(topology.len(), 1);

        let location = &topology.locations()[0];
        assert_eq!(location.name(), "Galeria Krakowska");
        assert_eq!(location.metadata.currency, "PLN");
        assert_eq!(location.metadata.features, vec![Feature::Covered]);
        assert_eq!(location.metadata.total_spots[&SpotType::Car], 40);
        assert_eq!(location.metadata.total_spots[&SpotType::CarHandicap], 2);
        assert_eq!(location.cameras.len(), 2);
        assert_eq!(location.cameras[0].spots[1].spot_type, SpotType::CarHandicap);
        assert_eq!(location.cameras[1].spots[0].spot_type, SpotType::Car);
        assert_eq!(location.cameras[1].url.scheme(), "file");
        assert_eq!(location.spot_count(), 3);
        assert_eq!(
            location.id,
            LocationId::from_geometry(&location.metadata.geometry)
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("topology.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let topology = Topology::load(&path).unwrap();
        assert_eq!(topology.len(), 1);
    }

    #[test]
    fn test_load_json_polygon() {
        let json = r#"{
            "locations": [{
                "name": "Lot P1",
                "geometry": { "type": "polygon", "points": [
                    { "latitude": 1.0, "longitude": 1.0 },
                    { "latitude": 1.0, "longitude": 2.0 },
                    { "latitude": 2.0, "longitude": 2.0 }
                ]},
                "cameras": [{ "url": "http://cam/1.jpg", "spots": [] }]
            }]
        }"#;
        let topology = Topology::parse(json, FileFormat::Json).unwrap();
        let location = &topology.locations()[0];
        assert_eq!(location.metadata.currency, "EUR");
        assert!(location.cameras[0].spots.is_empty());
    }

    #[test]
    fn test_empty_topology_rejected() {
        let result = Topology::from_config(TopologyConfig { locations: vec![] });
        assert!(matches!(result, Err(ConfigError::NoLocations)));
    }

    fn location(name: &str, latitude: f64) -> LocationConfig {
        LocationConfig {
            name: name.to_string(),
            address: String::new(),
            geometry: Geometry::Point {
                latitude,
                longitude: 10.0,
            },
            resources: vec![],
            total_spots: BTreeMap::new(),
            features: vec![],
            comment: BTreeMap::new(),
            currency: default_currency(),
            timezone: default_timezone(),
            cameras: vec![CameraConfig {
                url: "http://cam.local/a.jpg".to_string(),
                spots: vec![SpotRegion::new(0, 0, 10, 10, SpotType::Car)],
            }],
        }
    }

    #[test]
    fn test_location_without_cameras_rejected() {
        let mut raw = location("A", 1.0);
        raw.cameras.clear();
        let result = Topology::from_config(TopologyConfig {
            locations: vec![raw],
        });
        assert!(matches!(result, Err(ConfigError::NoCameras { .. })));
    }

    #[test]
    fn test_blank_name_rejected() {
        let result = Topology::from_config(TopologyConfig {
            locations: vec![location("   ", 1.0)],
        });
        assert!(matches!(result, Err(ConfigError::EmptyName { index: 0 })));
    }

    #[test]
    fn test_invalid_camera_url_rejected() {
        let mut raw = location("A", 1.0);
        raw.cameras[0].url = "not a url".to_string();
        let result = Topology::from_config(TopologyConfig {
            locations: vec![raw],
        });
        assert!(matches!(result, Err(ConfigError::InvalidUrl { camera: 0, .. })));
    }

    #[test]
    fn test_zero_area_region_rejected() {
        let mut raw = location("A", 1.0);
        raw.cameras[0]
            .spots
            .push(SpotRegion::new(5, 5, 0, 10, SpotType::Car));
        let result = Topology::from_config(TopologyConfig {
            locations: vec![raw],
        });
        assert!(matches!(
            result,
            Err(ConfigError::EmptyRegion {
                camera: 0,
                spot: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_degenerate_polygon_rejected() {
        let mut raw = location("A", 1.0);
        raw.geometry = Geometry::Polygon { points: vec![] };
        let result = Topology::from_config(TopologyConfig {
            locations: vec![raw],
        });
        assert!(matches!(
            result,
            Err(ConfigError::DegeneratePolygon { vertices: 0, .. })
        ));
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let result = Topology::from_config(TopologyConfig {
            locations: vec![location("A", 1.0), location("B", 1.0000000001)],
        });
        assert!(matches!(result, Err(ConfigError::DuplicateIdentity { .. })));
    }
}
