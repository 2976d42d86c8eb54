//! Country boundaries and the tiered country lookup for tiles

use std::fs;
use std::path::Path;

use geo::{BoundingRect, Centroid, Contains, EuclideanDistance, Intersects};
use geo::{LineString, MultiPolygon, Point, Polygon};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{LeaderboardError, Result};
use crate::spatial::project_ring;
use crate::store::Store;

pub type CountryId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    Contains,
    Intersects,
    Nearest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub country_id: CountryId,
    pub tier: ResolutionTier,
}

/// Attributes a polygon to a country: the country containing its centroid,
/// else one intersecting it, else the one nearest its centroid. Ties always
/// go to the lowest country id.
pub struct CountryResolver<'s> {
    store: &'s Store,
}

impl<'s> CountryResolver<'s> {
    pub fn new(store: &'s Store) -> Self {
        Self { store }
    }

    pub fn resolve(&self, polygon: &Polygon<f64>) -> Result<Resolution> {
        let centroid = polygon
            .centroid()
            .ok_or_else(|| LeaderboardError::NoCountryAvailable {
                detail: "an empty polygon".to_string(),
            })?;

        let found = self
            .containing(centroid)?
            .map(|id| (id, ResolutionTier::Contains));
        let found = match found {
            Some(found) => Some(found),
            None => self
                .intersecting(polygon)?
                .map(|id| (id, ResolutionTier::Intersects)),
        };
        let (country_id, tier) = match found {
            Some(found) => found,
            None => (self.nearest(centroid)?, ResolutionTier::Nearest),
        };
        debug!(country_id, ?tier, x = centroid.x(), y = centroid.y(), "resolved country");
        Ok(Resolution { country_id, tier })
    }

    fn containing(&self, centroid: Point<f64>) -> Result<Option<CountryId>> {
        let mut stmt = self.store.conn().prepare_cached(
            "SELECT id, geometry FROM country_bounds
             WHERE min_x <= ?1 AND ?1 <= max_x AND min_y <= ?2 AND ?2 <= max_y
             ORDER BY id",
        )?;
        let mut rows = stmt.query(params![centroid.x(), centroid.y()])?;
        while let Some(row) = rows.next()? {
            let boundary = decode_boundary(&row.get::<_, String>(1)?)?;
            if boundary.contains(&centroid) {
                return Ok(Some(row.get(0)?));
            }
        }
        Ok(None)
    }

    fn intersecting(&self, polygon: &Polygon<f64>) -> Result<Option<CountryId>> {
        let Some(rect) = polygon.bounding_rect() else {
            return Ok(None);
        };
        let mut stmt = self.store.conn().prepare_cached(
            "SELECT id, geometry FROM country_bounds
             WHERE min_x <= ?3 AND ?1 <= max_x AND min_y <= ?4 AND ?2 <= max_y
             ORDER BY id",
        )?;
        let mut rows = stmt.query(params![
            rect.min().x,
            rect.min().y,
            rect.max().x,
            rect.max().y
        ])?;
        while let Some(row) = rows.next()? {
            let boundary = decode_boundary(&row.get::<_, String>(1)?)?;
            if boundary.intersects(polygon) {
                return Ok(Some(row.get(0)?));
            }
        }
        Ok(None)
    }

    fn nearest(&self, centroid: Point<f64>) -> Result<CountryId> {
        let mut stmt = self
            .store
            .conn()
            .prepare_cached("SELECT id, geometry FROM country_bounds ORDER BY id")?;
        let mut rows = stmt.query([])?;
        let mut seen_any = false;
        let mut best: Option<(f64, CountryId)> = None;
        while let Some(row) = rows.next()? {
            seen_any = true;
            let id: CountryId = row.get(0)?;
            let boundary = decode_boundary(&row.get::<_, String>(1)?)?;
            let distance = boundary
                .iter()
                .map(|polygon| centroid.euclidean_distance(polygon))
                .fold(f64::INFINITY, f64::min);
            if !distance.is_finite() {
                continue;
            }
            // Rows arrive in id order, so strict `<` keeps the lowest id on ties.
            if best.map_or(true, |(best_distance, _)| distance < best_distance) {
                best = Some((distance, id));
            }
        }
        match best {
            Some((_, id)) => Ok(id),
            None if !seen_any => Err(LeaderboardError::CountryLookupExhausted),
            None => Err(LeaderboardError::NoCountryAvailable {
                detail: format!("point ({}, {})", centroid.x(), centroid.y()),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Country {
    pub id: CountryId,
    pub name: String,
    pub iso_code: Option<String>,
}

pub fn country(conn: &Connection, id: CountryId) -> Result<Option<Country>> {
    let country = conn
        .query_row(
            "SELECT id, name, iso_code FROM country_bounds WHERE id = ?1",
            [id],
            |row| {
                Ok(Country {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    iso_code: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(country)
}

/// Inserts one boundary that is already in EPSG:3857.
pub fn insert_country(
    conn: &Connection,
    name: &str,
    iso_code: Option<&str>,
    boundary: &MultiPolygon<f64>,
) -> Result<CountryId> {
    let rect = boundary
        .bounding_rect()
        .ok_or_else(|| LeaderboardError::Dataset {
            origin: name.to_string(),
            message: "boundary has no coordinates".to_string(),
        })?;
    conn.execute(
        "INSERT INTO country_bounds (name, iso_code, min_x, min_y, max_x, max_y, geometry)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            name,
            iso_code,
            rect.min().x,
            rect.min().y,
            rect.max().x,
            rect.max().y,
            encode_boundary(boundary)?
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

// Stored as JSON: polygons -> rings (exterior first) -> [x, y].
type StoredBoundary = Vec<Vec<Vec<[f64; 2]>>>;

fn encode_boundary(boundary: &MultiPolygon<f64>) -> Result<String> {
    let ring = |line: &LineString<f64>| line.coords().map(|c| [c.x, c.y]).collect::<Vec<_>>();
    let stored: StoredBoundary = boundary
        .iter()
        .map(|polygon| {
            std::iter::once(polygon.exterior())
                .chain(polygon.interiors())
                .map(ring)
                .collect()
        })
        .collect();
    Ok(serde_json::to_string(&stored)?)
}

fn decode_boundary(text: &str) -> Result<MultiPolygon<f64>> {
    let stored: StoredBoundary = serde_json::from_str(text)?;
    let polygons = stored
        .into_iter()
        .filter(|rings| !rings.is_empty())
        .map(|rings| {
            let mut rings = rings
                .into_iter()
                .map(|ring| ring.into_iter().map(|[x, y]| (x, y)).collect::<LineString<f64>>());
            let exterior = rings.next().unwrap_or_else(|| LineString::new(Vec::new()));
            Polygon::new(exterior, rings.collect())
        })
        .collect();
    Ok(MultiPolygon::new(polygons))
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    properties: FeatureProperties,
    geometry: Option<FeatureGeometry>,
}

// Natural Earth exports carry both `name` and `ADMIN`, so each spelling is
// its own field.
#[derive(Debug, Deserialize)]
struct FeatureProperties {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "ADMIN")]
    admin: Option<String>,
    #[serde(default)]
    iso_code: Option<String>,
    #[serde(default)]
    iso_a2: Option<String>,
}

impl FeatureProperties {
    fn name(&self) -> Option<&str> {
        self.name.as_deref().or(self.admin.as_deref())
    }

    fn iso_code(&self) -> Option<&str> {
        self.iso_code.as_deref().or(self.iso_a2.as_deref())
    }
}

type Position = Vec<f64>;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
enum FeatureGeometry {
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

/// Loads a WGS84 GeoJSON `FeatureCollection` of country boundaries,
/// projecting each to Web Mercator. All rows go in one transaction.
pub fn load_geojson(store: &Store, path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    let dataset_error = |message: String| LeaderboardError::Dataset {
        origin: path.display().to_string(),
        message,
    };
    let text = fs::read_to_string(path)?;
    let collection: FeatureCollection =
        serde_json::from_str(&text).map_err(|err| dataset_error(err.to_string()))?;

    let mut boundaries = Vec::with_capacity(collection.features.len());
    for (index, feature) in collection.features.into_iter().enumerate() {
        let Some(name) = feature.properties.name().map(str::to_owned) else {
            return Err(dataset_error(format!("feature {index} has no name or ADMIN property")));
        };
        let Some(geometry) = feature.geometry else {
            warn!(country = %name, "feature has no geometry, skipping");
            continue;
        };
        let boundary = project_geometry(geometry)
            .map_err(|message| dataset_error(format!("{name}: {message}")))?;
        let iso_code = feature.properties.iso_code().map(str::to_owned);
        boundaries.push((name, iso_code, boundary));
    }

    let loaded = store.retry().run("load_countries", || {
        let tx = store.write_transaction()?;
        for (name, iso_code, boundary) in &boundaries {
            insert_country(&tx, name, iso_code.as_deref(), boundary)?;
        }
        tx.commit()?;
        Ok(boundaries.len())
    })?;
    info!(path = %path.display(), countries = loaded, "loaded country boundaries");
    Ok(loaded)
}

fn project_geometry(geometry: FeatureGeometry) -> std::result::Result<MultiPolygon<f64>, String> {
    let polygons = match geometry {
        FeatureGeometry::Polygon(rings) => vec![rings],
        FeatureGeometry::MultiPolygon(polygons) => polygons,
    };
    let mut projected = Vec::with_capacity(polygons.len());
    for rings in polygons {
        let mut lines = Vec::with_capacity(rings.len());
        for ring in rings {
            let pairs = ring
                .iter()
                .map(|position| match position.as_slice() {
                    [lon, lat, ..] => Ok([*lon, *lat]),
                    _ => Err("position needs at least two numbers".to_string()),
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;
            lines.push(project_ring(&pairs));
        }
        let mut lines = lines.into_iter();
        let Some(exterior) = lines.next() else {
            return Err("polygon without rings".to_string());
        };
        projected.push(Polygon::new(exterior, lines.collect()));
    }
    Ok(MultiPolygon::new(projected))
}
