//! Location identity derived from geography
//!
//! The same physical location must map to the same id across polling cycles,
//! process restarts and providers. Coordinates are rounded to a fixed number
//! of decimal places before hashing so sources reporting different precision
//! still collapse to one id.

use crate::models::{Coordinate, Geometry};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Decimal places kept before hashing (about 0.1 m at the equator)
pub const COORDINATE_PRECISION: i32 = 6;

/// Bytes of the digest kept in the id
const ID_BYTES: usize = 16;

/// Opaque location identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationId(String);

impl LocationId {
    /// Identity of a single coordinate.
    ///
    /// NaN or out-of-range input is a caller error and is not detected here.
    pub fn from_coordinate(coordinate: &Coordinate) -> Self {
        let lat = quantize(coordinate.latitude);
        let lon = quantize(coordinate.longitude);

        let digest = Sha256::digest(format!("{lat}:{lon}").as_bytes());
        Self(hex::encode(&digest[..ID_BYTES]))
    }

    /// Identity of a geometry, using the centroid for polygons
    pub fn from_geometry(geometry: &Geometry) -> Self {
        Self::from_coordinate(&geometry.centroid())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LocationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Degrees to integer units of the fixed precision; -0.0 becomes 0
fn quantize(degrees: f64) -> i64 {
    (degrees * 10f64.powi(COORDINATE_PRECISION)).round() as i64
}
