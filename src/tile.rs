use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::country::{CountryId, CountryResolver};
use crate::error::Result;
use crate::spatial::{snap, Coordinate, GridCell, ProjectedPoint};
use crate::store::Store;

pub type TileId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileOutcome {
    pub tile_id: TileId,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub id: TileId,
    pub cell: GridCell,
    pub country_id: CountryId,
}

/// Get-or-create access to tiles.
///
/// Duplicate cells are prevented by the `UNIQUE (min_x, min_y)` constraint:
/// the insert runs in an immediate transaction with `ON CONFLICT DO NOTHING`,
/// and a writer that loses the race re-reads the winner's row.
pub struct TileStore<'s> {
    store: &'s Store,
}

impl<'s> TileStore<'s> {
    pub fn new(store: &'s Store) -> Self {
        Self { store }
    }

    pub fn get_or_create(&self, lon: f64, lat: f64) -> Result<TileOutcome> {
        let coordinate = Coordinate::new(lon, lat)?;
        self.get_or_create_at(&coordinate)
    }

    pub fn get_or_create_at(&self, coordinate: &Coordinate) -> Result<TileOutcome> {
        self.store
            .retry()
            .run("get_or_create_tile", || self.try_get_or_create(coordinate))
    }

    fn try_get_or_create(&self, coordinate: &Coordinate) -> Result<TileOutcome> {
        if let Some(tile_id) = containing_tile(self.store.conn(), coordinate.project())? {
            debug!(tile_id, "tile exists");
            return Ok(TileOutcome {
                tile_id,
                created: false,
            });
        }

        let cell = snap(coordinate);
        let resolution = CountryResolver::new(self.store)
            .resolve(&cell.to_polygon())
            .inspect_err(|err| {
                if err.is_recoverable() {
                    warn!(
                        lon = coordinate.lon(),
                        lat = coordinate.lat(),
                        cell = %cell.to_ewkt(),
                        error = %err,
                        "no country for tile, not creating it"
                    );
                }
            })?;

        let tx = self.store.write_transaction()?;
        let inserted = tx.execute(
            "INSERT INTO tile (min_x, min_y, max_x, max_y, geometry, country_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (min_x, min_y) DO NOTHING",
            params![
                cell.easting,
                cell.northing,
                cell.max_easting(),
                cell.max_northing(),
                cell.to_ewkt(),
                resolution.country_id
            ],
        )?;
        let outcome = if inserted == 1 {
            TileOutcome {
                tile_id: tx.last_insert_rowid(),
                created: true,
            }
        } else {
            let tile_id: TileId = tx.query_row(
                "SELECT id FROM tile WHERE min_x = ?1 AND min_y = ?2",
                params![cell.easting, cell.northing],
                |row| row.get(0),
            )?;
            TileOutcome {
                tile_id,
                created: false,
            }
        };
        tx.commit()?;

        if outcome.created {
            info!(
                tile_id = outcome.tile_id,
                country_id = resolution.country_id,
                tier = ?resolution.tier,
                "created tile"
            );
        } else {
            debug!(tile_id = outcome.tile_id, "tile created concurrently, reusing it");
        }
        Ok(outcome)
    }

    /// Read-only lookup of the tile covering a coordinate.
    pub fn find(&self, lon: f64, lat: f64) -> Result<Option<Tile>> {
        let coordinate = Coordinate::new(lon, lat)?;
        match containing_tile(self.store.conn(), coordinate.project())? {
            Some(id) => self.get(id),
            None => Ok(None),
        }
    }

    pub fn get(&self, id: TileId) -> Result<Option<Tile>> {
        let tile = self
            .store
            .conn()
            .query_row(
                "SELECT id, min_x, min_y, country_id FROM tile WHERE id = ?1",
                [id],
                |row| {
                    Ok(Tile {
                        id: row.get(0)?,
                        cell: GridCell {
                            easting: row.get(1)?,
                            northing: row.get(2)?,
                        },
                        country_id: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(tile)
    }
}

fn containing_tile(conn: &Connection, point: ProjectedPoint) -> Result<Option<TileId>> {
    let id = conn
        .prepare_cached(
            "SELECT id FROM tile
             WHERE min_x <= ?1 AND ?1 < max_x AND min_y <= ?2 AND ?2 < max_y
             ORDER BY id LIMIT 1",
        )?
        .query_row(params![point.easting, point.northing], |row| row.get(0))
        .optional()?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::country::insert_country;
    use crate::error::LeaderboardError;
    use geo::{MultiPolygon, Rect};

    fn store_with_world() -> (Store, CountryId) {
        let store = Store::open_in_memory().unwrap();
        let world = MultiPolygon::new(vec![Rect::new(
            (-20_037_508.0, -20_037_508.0),
            (20_037_508.0, 20_037_508.0),
        )
        .to_polygon()]);
        let id = insert_country(store.conn(), "World", None, &world).unwrap();
        (store, id)
    }

    #[test]
    fn second_call_reuses_tile() {
        let (store, world) = store_with_world();
        let tiles = TileStore::new(&store);

        let first = tiles.get_or_create(-122.4194, 37.7749).unwrap();
        assert!(first.created);
        let second = tiles.get_or_create(-122.4194, 37.7749).unwrap();
        assert_eq!(second, TileOutcome { tile_id: first.tile_id, created: false });

        let tile = tiles.get(first.tile_id).unwrap().unwrap();
        assert_eq!(tile.country_id, world);
        assert_eq!(store.tile_count().unwrap(), 1);
    }

    #[test]
    fn nearby_points_share_a_tile() {
        let (store, _) = store_with_world();
        let tiles = TileStore::new(&store);
        // About 11 m apart, well inside one 500 m cell.
        let a = tiles.get_or_create(0.0010, 0.0010).unwrap();
        let b = tiles.get_or_create(0.0011, 0.0011).unwrap();
        assert_eq!(a.tile_id, b.tile_id);
        // Roughly 1.1 km east is a different cell.
        let c = tiles.get_or_create(0.0110, 0.0010).unwrap();
        assert_ne!(a.tile_id, c.tile_id);
        assert_eq!(store.tile_count().unwrap(), 2);
    }

    #[test]
    fn stored_geometry_matches_snap() {
        let (store, _) = store_with_world();
        let outcome = TileStore::new(&store).get_or_create(2.3522, 48.8566).unwrap();
        let (wkt, min_x): (String, f64) = store
            .conn()
            .query_row(
                "SELECT geometry, min_x FROM tile WHERE id = ?1",
                [outcome.tile_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        let cell = snap(&Coordinate::new(2.3522, 48.8566).unwrap());
        assert_eq!(wkt, cell.to_ewkt());
        assert_eq!(min_x, cell.easting);
    }

    #[test]
    fn invalid_input_never_touches_store() {
        let (store, _) = store_with_world();
        let tiles = TileStore::new(&store);
        for (lon, lat) in [(f64::NAN, 0.0), (0.0, f64::INFINITY), (200.0, 0.0), (0.0, -90.0)] {
            let err = tiles.get_or_create(lon, lat).unwrap_err();
            assert!(matches!(err, LeaderboardError::InvalidInput { .. }));
        }
        assert_eq!(store.tile_count().unwrap(), 0);
    }

    #[test]
    fn missing_countries_leave_no_tile() {
        let store = Store::open_in_memory().unwrap();
        let err = TileStore::new(&store).get_or_create(10.0, 10.0).unwrap_err();
        assert!(matches!(err, LeaderboardError::CountryLookupExhausted));
        assert!(err.is_recoverable());
        assert_eq!(store.tile_count().unwrap(), 0);
    }

    #[test]
    fn find_does_not_create() {
        let (store, _) = store_with_world();
        let tiles = TileStore::new(&store);
        assert!(tiles.find(5.0, 5.0).unwrap().is_none());
        let created = tiles.get_or_create(5.0, 5.0).unwrap();
        assert_eq!(tiles.find(5.0, 5.0).unwrap().unwrap().id, created.tile_id);
    }

    #[test]
    fn conflicting_insert_rereads_existing_row() {
        let (store, world) = store_with_world();
        let coordinate = Coordinate::new(-0.1276, 51.5072).unwrap();
        let cell = snap(&coordinate);
        // A row for the same cell whose stored extent misses the point, so
        // the containment read fails and the insert hits the constraint.
        store
            .conn()
            .execute(
                "INSERT INTO tile (min_x, min_y, max_x, max_y, geometry, country_id)
                 VALUES (?1, ?2, ?1, ?2, 'degenerate', ?3)",
                params![cell.easting, cell.northing, world],
            )
            .unwrap();
        let existing = store.conn().last_insert_rowid();

        let outcome = TileStore::new(&store).get_or_create_at(&coordinate).unwrap();
        assert_eq!(outcome, TileOutcome { tile_id: existing, created: false });
        assert_eq!(store.tile_count().unwrap(), 1);
    }
}
