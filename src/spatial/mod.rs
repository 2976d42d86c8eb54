//! Coordinates and the Web Mercator projection used for every stored geometry

mod grid;

pub use grid::{snap, GridCell, CELL_SIZE_M};

use serde::{Deserialize, Serialize};

use crate::error::{LeaderboardError, Result};

/// SRID tag of every geometry in the store (Web Mercator).
pub const SRID: u32 = 3857;

/// Spherical Mercator earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Latitude at which Web Mercator becomes a square world.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// WGS84 coordinate, validated on construction and on deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct Coordinate {
    lon: f64,
    lat: f64,
}

#[derive(Deserialize)]
struct RawCoordinate {
    lon: f64,
    lat: f64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = LeaderboardError;

    fn try_from(raw: RawCoordinate) -> Result<Self> {
        Coordinate::new(raw.lon, raw.lat)
    }
}

impl Coordinate {
    pub fn new(lon: f64, lat: f64) -> Result<Self> {
        let invalid = |reason| LeaderboardError::InvalidInput { lon, lat, reason };
        if !lon.is_finite() || !lat.is_finite() {
            return Err(invalid("coordinates must be finite numbers"));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(invalid("longitude outside [-180, 180]"));
        }
        if !(-MAX_LATITUDE..=MAX_LATITUDE).contains(&lat) {
            return Err(invalid("latitude outside the Web Mercator range"));
        }
        Ok(Self { lon, lat })
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn project(&self) -> ProjectedPoint {
        let easting = EARTH_RADIUS_M * self.lon.to_radians();
        let northing = EARTH_RADIUS_M
            * (std::f64::consts::FRAC_PI_4 + self.lat.to_radians() / 2.0)
                .tan()
                .ln();
        ProjectedPoint { easting, northing }
    }
}

/// Point in EPSG:3857 metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectedPoint {
    pub easting: f64,
    pub northing: f64,
}

impl ProjectedPoint {
    pub fn new(easting: f64, northing: f64) -> Self {
        Self { easting, northing }
    }

    pub fn to_wgs84(&self) -> (f64, f64) {
        let lon = (self.easting / EARTH_RADIUS_M).to_degrees();
        let lat = (2.0 * (self.northing / EARTH_RADIUS_M).exp().atan()
            - std::f64::consts::FRAC_PI_2)
            .to_degrees();
        (lon, lat)
    }
}

impl From<ProjectedPoint> for geo::Point<f64> {
    fn from(value: ProjectedPoint) -> Self {
        geo::Point::new(value.easting, value.northing)
    }
}

/// Projects one WGS84 ring, clamping latitudes to the Mercator limit.
pub(crate) fn project_ring(ring: &[[f64; 2]]) -> geo::LineString<f64> {
    ring.iter()
        .map(|&[lon, lat]| {
            let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
            let point = Coordinate { lon, lat }.project();
            geo::Coord {
                x: point.easting,
                y: point.northing,
            }
        })
        .collect()
}
