use serde::{Deserialize, Serialize};

use super::{Coordinate, ProjectedPoint};

/// Edge length of a tile in projected metres.
pub const CELL_SIZE_M: f64 = 500.0;

/// Axis-aligned 500 m square on the 500 m lattice, identified by its
/// lower-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub easting: f64,
    pub northing: f64,
}

pub fn snap(coordinate: &Coordinate) -> GridCell {
    GridCell::containing(coordinate.project())
}

// Scale-by-two-then-halve matches the corners of tiles already in the store;
// keep it even though it reads like floor(v / 500) * 500.
fn snap_axis(value: f64) -> f64 {
    (value / 1000.0 * 2.0).floor() / 2.0 * 1000.0
}

impl GridCell {
    pub fn containing(point: ProjectedPoint) -> Self {
        Self {
            easting: snap_axis(point.easting),
            northing: snap_axis(point.northing),
        }
    }

    pub fn max_easting(&self) -> f64 {
        self.easting + CELL_SIZE_M
    }

    pub fn max_northing(&self) -> f64 {
        self.northing + CELL_SIZE_M
    }

    /// Lower-left, upper-left, upper-right, lower-right, lower-left.
    pub fn vertices(&self) -> [(f64, f64); 5] {
        let (e, n) = (self.easting, self.northing);
        [
            (e, n),
            (e, n + CELL_SIZE_M),
            (e + CELL_SIZE_M, n + CELL_SIZE_M),
            (e + CELL_SIZE_M, n),
            (e, n),
        ]
    }

    /// Half-open containment, consistent with floor snapping.
    pub fn contains(&self, point: ProjectedPoint) -> bool {
        self.easting <= point.easting
            && point.easting < self.max_easting()
            && self.northing <= point.northing
            && point.northing < self.max_northing()
    }

    pub fn centroid(&self) -> ProjectedPoint {
        ProjectedPoint::new(
            self.easting + CELL_SIZE_M / 2.0,
            self.northing + CELL_SIZE_M / 2.0,
        )
    }

    pub fn to_polygon(&self) -> geo::Polygon<f64> {
        let ring: geo::LineString<f64> = self.vertices().iter().copied().collect();
        geo::Polygon::new(ring, Vec::new())
    }

    /// WKT with SRID prefix, the form tiles are written in.
    pub fn to_ewkt(&self) -> String {
        let points = self
            .vertices()
            .iter()
            .map(|(x, y)| format!("{x} {y}"))
            .collect::<Vec<_>>()
            .join(",");
        format!("SRID={};POLYGON(({points}))", super::SRID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lon: f64, lat: f64) -> Coordinate {
        Coordinate::new(lon, lat).unwrap()
    }

    #[test]
    fn snapping_is_deterministic() {
        let sf = coord(-122.4194, 37.7749);
        let a = snap(&sf);
        let b = snap(&sf);
        assert_eq!(a.easting.to_bits(), b.easting.to_bits());
        assert_eq!(a.northing.to_bits(), b.northing.to_bits());
        assert_eq!(a.to_ewkt(), b.to_ewkt());
    }

    #[test]
    fn corners_sit_on_the_lattice() {
        let cell = snap(&coord(-122.4194, 37.7749));
        assert_eq!(cell.easting % CELL_SIZE_M, 0.0);
        assert_eq!(cell.northing % CELL_SIZE_M, 0.0);
        assert!(cell.contains(coord(-122.4194, 37.7749).project()));
    }

    #[test]
    fn snaps_downward_not_to_nearest() {
        assert_eq!(GridCell::containing(ProjectedPoint::new(499.999, 0.0)).easting, 0.0);
        assert_eq!(GridCell::containing(ProjectedPoint::new(500.0, 0.0)).easting, 500.0);
        assert_eq!(GridCell::containing(ProjectedPoint::new(-0.001, 0.0)).easting, -500.0);
        assert_eq!(GridCell::containing(ProjectedPoint::new(0.0, -1250.0)).northing, -1500.0);
    }

    #[test]
    fn points_in_one_cell_share_it() {
        let cell = GridCell::containing(ProjectedPoint::new(1000.0, 2000.0));
        for (de, dn) in [(0.0, 0.0), (1.0, 499.0), (499.5, 0.25), (250.0, 250.0)] {
            let other = GridCell::containing(ProjectedPoint::new(1000.0 + de, 2000.0 + dn));
            assert_eq!(cell, other);
        }
        let next = GridCell::containing(ProjectedPoint::new(1500.0, 2000.0));
        assert_ne!(cell, next);
    }

    #[test]
    fn polygon_is_closed_and_starts_lower_left() {
        let cell = GridCell {
            easting: 1000.0,
            northing: -500.0,
        };
        let vertices = cell.vertices();
        assert_eq!(vertices[0], vertices[4]);
        assert_eq!(vertices[0], (1000.0, -500.0));
        assert_eq!(vertices[1], (1000.0, 0.0));
        assert_eq!(vertices[2], (1500.0, 0.0));
        assert_eq!(vertices[3], (1500.0, -500.0));
        assert_eq!(
            cell.to_ewkt(),
            "SRID=3857;POLYGON((1000 -500,1000 0,1500 0,1500 -500,1000 -500))"
        );
    }

    #[test]
    fn centroid_is_cell_middle() {
        let cell = GridCell {
            easting: 0.0,
            northing: 500.0,
        };
        assert_eq!(cell.centroid(), ProjectedPoint::new(250.0, 750.0));
    }
}
