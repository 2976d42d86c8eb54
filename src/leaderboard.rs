use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use tracing::{debug, warn};

use crate::calendar::{Clock, SystemClock};
use crate::error::{LeaderboardError, Result};
use crate::rollover::WeekRollover;
use crate::spatial::Coordinate;
use crate::tile::{TileOutcome, TileStore};
use crate::store::Store;

pub type ContributorId = i64;

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Recorded {
        tile: TileOutcome,
        week: u32,
        rolled_over: bool,
    },
    /// The tile could not be attributed to a country; nothing was written.
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub contributor: String,
    pub observations: i64,
    pub tiles: i64,
}

/// Records contributions into the current reporting week.
pub struct Leaderboard<'s, C = SystemClock> {
    store: &'s Store,
    clock: C,
}

impl<'s> Leaderboard<'s, SystemClock> {
    pub fn new(store: &'s Store) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<'s, C: Clock> Leaderboard<'s, C> {
    pub fn with_clock(store: &'s Store, clock: C) -> Self {
        Self { store, clock }
    }

    pub fn rollover(&self) -> WeekRollover<'s, &C> {
        WeekRollover::with_clock(self.store, &self.clock)
    }

    pub fn contributor_id(&self, name: &str) -> Result<ContributorId> {
        let name = contributor_name(name)?;
        self.store.retry().run("contributor_id", || {
            let conn = self.store.conn();
            if let Some(id) = conn
                .query_row("SELECT id FROM contributor WHERE name = ?1", [name], |row| row.get(0))
                .optional()?
            {
                return Ok(id);
            }
            conn.execute(
                "INSERT INTO contributor (name) VALUES (?1) ON CONFLICT (name) DO NOTHING",
                [name],
            )?;
            Ok(conn.query_row("SELECT id FROM contributor WHERE name = ?1", [name], |row| row.get(0))?)
        })
    }

    /// Adds `observations` for `name` on the tile covering (lon, lat).
    ///
    /// The tile is resolved before anything else is written, so coordinates
    /// no country can be found for are skipped without side effects. The
    /// rollover check runs before the observation insert, so a new week is
    /// truncated before it receives rows.
    pub fn record(&self, name: &str, lon: f64, lat: f64, observations: u32) -> Result<IngestOutcome> {
        let coordinate = Coordinate::new(lon, lat)?;
        let name = contributor_name(name)?;

        let tile = match TileStore::new(self.store).get_or_create_at(&coordinate) {
            Ok(tile) => tile,
            Err(err) if err.is_recoverable() => {
                warn!(contributor = name, lon, lat, error = %err, "skipping observation");
                return Ok(IngestOutcome::Skipped {
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        };
        let contributor = self.contributor_id(name)?;
        let rollover = self.rollover().is_week_rolling_over()?;

        self.store.retry().run("record_observation", || {
            self.store.conn().execute(
                "INSERT INTO weekly_observation (week, contributor_id, tile_id, observations)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (week, contributor_id, tile_id)
                 DO UPDATE SET observations = observations + excluded.observations",
                params![rollover.week, contributor, tile.tile_id, observations],
            )?;
            Ok(())
        })?;
        debug!(contributor = name, tile_id = tile.tile_id, week = rollover.week, observations, "recorded");

        Ok(IngestOutcome::Recorded {
            tile,
            week: rollover.week,
            rolled_over: rollover.rolled_over,
        })
    }

    /// Contributors for `week`, busiest first.
    pub fn standings(&self, week: u32, limit: usize) -> Result<Vec<Standing>> {
        let mut stmt = self.store.conn().prepare_cached(
            "SELECT c.name, SUM(w.observations) AS total, COUNT(w.tile_id) AS tiles
             FROM weekly_observation w
             JOIN contributor c ON c.id = w.contributor_id
             WHERE w.week = ?1
             GROUP BY c.id
             ORDER BY total DESC, tiles DESC, c.name ASC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![week, limit as i64], |row| {
            Ok(Standing {
                contributor: row.get(0)?,
                observations: row.get(1)?,
                tiles: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn contributor_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LeaderboardError::InvalidContributor);
    }
    Ok(name)
}
