use rusqlite::Connection;
use tracing::debug;

use crate::error::Result;

const SCHEMA_VERSION: i64 = 1;

pub(crate) fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    debug!(version = SCHEMA_VERSION, "schema ready");
    Ok(())
}

pub(crate) fn reset(conn: &Connection, keep_countries: bool) -> Result<()> {
    conn.execute_batch(
        "
        DELETE FROM weekly_observation;
        DELETE FROM contributor;
        DELETE FROM leaderboard_globals;
        DELETE FROM tile;
        ",
    )?;
    if !keep_countries {
        conn.execute("DELETE FROM country_bounds", [])?;
    }
    Ok(())
}

// Geometries are EPSG:3857. Bounding-box columns back the spatial
// prefilters; exact predicates run over the decoded geometry.
const SCHEMA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS country_bounds (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        iso_code TEXT,
        srid INTEGER NOT NULL DEFAULT 3857,
        min_x REAL NOT NULL,
        min_y REAL NOT NULL,
        max_x REAL NOT NULL,
        max_y REAL NOT NULL,
        geometry TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS country_bounds_bbox
        ON country_bounds (min_x, max_x, min_y, max_y);

    CREATE TABLE IF NOT EXISTS tile (
        id INTEGER PRIMARY KEY,
        srid INTEGER NOT NULL DEFAULT 3857,
        min_x REAL NOT NULL,
        min_y REAL NOT NULL,
        max_x REAL NOT NULL,
        max_y REAL NOT NULL,
        geometry TEXT NOT NULL,
        country_id INTEGER NOT NULL REFERENCES country_bounds (id),
        UNIQUE (min_x, min_y)
    );

    CREATE INDEX IF NOT EXISTS tile_bbox ON tile (min_x, max_x, min_y, max_y);

    CREATE TABLE IF NOT EXISTS leaderboard_globals (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        current_week INTEGER CHECK (current_week IS NULL OR (0 < current_week AND current_week < 54))
    );

    CREATE TABLE IF NOT EXISTS contributor (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS weekly_observation (
        week INTEGER NOT NULL CHECK (0 < week AND week < 54),
        contributor_id INTEGER NOT NULL REFERENCES contributor (id),
        tile_id INTEGER NOT NULL REFERENCES tile (id),
        observations INTEGER NOT NULL,
        PRIMARY KEY (week, contributor_id, tile_id)
    );
";
