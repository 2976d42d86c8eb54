//! Weekly rollover of the leaderboard.
//!
//! Weeks 1-53 are reused as years roll over. The week currently being
//! filled lives in the `leaderboard_globals` singleton; when the real week
//! moves on, the stored value advances and the incoming week's rows (a year
//! old by now) are truncated before anything is written into them.

use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::calendar::{is_valid_week, week_number, Clock, SystemClock};
use crate::error::Result;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolloverOutcome {
    pub week: u32,
    pub rolled_over: bool,
}

pub struct WeekRollover<'s, C = SystemClock> {
    store: &'s Store,
    clock: C,
}

impl<'s> WeekRollover<'s, SystemClock> {
    pub fn new(store: &'s Store) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<'s, C: Clock> WeekRollover<'s, C> {
    pub fn with_clock(store: &'s Store, clock: C) -> Self {
        Self { store, clock }
    }

    /// Stored week, initialising the singleton row on first access.
    pub fn current_week(&self) -> Result<u32> {
        self.store.retry().run("current_week", || {
            let today = week_number(self.clock.today());
            let tx = self.store.write_transaction()?;
            let week = load_or_initialise(&tx, today)?;
            tx.commit()?;
            Ok(week)
        })
    }

    /// Detects *and commits* a week change. Only the caller that performs
    /// the transition sees `rolled_over = true`; an immediate second call
    /// reports `false`.
    pub fn is_week_rolling_over(&self) -> Result<RolloverOutcome> {
        self.store.retry().run("week_rollover", || {
            let actual = week_number(self.clock.today());
            let tx = self.store.write_transaction()?;
            let stored = load_or_initialise(&tx, actual)?;
            if stored == actual {
                tx.commit()?;
                return Ok(RolloverOutcome {
                    week: actual,
                    rolled_over: false,
                });
            }

            let swapped = tx.execute(
                "UPDATE leaderboard_globals SET current_week = ?1
                 WHERE id = 1 AND current_week = ?2",
                params![actual, stored],
            )? == 1;
            let truncated = if swapped {
                tx.execute("DELETE FROM weekly_observation WHERE week = ?1", [actual])?
            } else {
                0
            };
            tx.commit()?;

            if swapped {
                info!(from = stored, to = actual, truncated, "week rolled over");
            }
            Ok(RolloverOutcome {
                week: actual,
                rolled_over: swapped,
            })
        })
    }
}

// NULL is the "never initialised" sentinel; the CHECK constraint keeps any
// stored value inside 1..=53.
fn load_or_initialise(conn: &Connection, today: u32) -> Result<u32> {
    conn.execute(
        "INSERT INTO leaderboard_globals (id, current_week) VALUES (1, NULL)
         ON CONFLICT (id) DO NOTHING",
        [],
    )?;
    let stored: Option<i64> = conn.query_row(
        "SELECT current_week FROM leaderboard_globals WHERE id = 1",
        [],
        |row| row.get(0),
    )?;
    match stored {
        Some(week) if is_valid_week(week) => Ok(week as u32),
        _ => {
            conn.execute(
                "UPDATE leaderboard_globals SET current_week = ?1 WHERE id = 1",
                [today],
            )?;
            debug!(week = today, "initialised current week");
            Ok(today)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::FixedClock;
    use chrono::NaiveDate;

    fn on(y: i32, m: u32, d: u32) -> FixedClock {
        FixedClock(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn set_week(store: &Store, week: u32) {
        store
            .conn()
            .execute(
                "INSERT INTO leaderboard_globals (id, current_week) VALUES (1, ?1)
                 ON CONFLICT (id) DO UPDATE SET current_week = excluded.current_week",
                [week],
            )
            .unwrap();
    }

    #[test]
    fn absent_row_is_created_with_todays_week() {
        let store = Store::open_in_memory().unwrap();
        let week = WeekRollover::with_clock(&store, on(2026, 10, 14)).current_week().unwrap();
        assert_eq!(week, 42);
        let rows: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM leaderboard_globals", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn system_clock_week_is_in_range() {
        let store = Store::open_in_memory().unwrap();
        let week = WeekRollover::new(&store).current_week().unwrap();
        assert!((1..=53).contains(&week));
    }

    #[test]
    fn first_initialisation_is_not_a_rollover() {
        let store = Store::open_in_memory().unwrap();
        let outcome = WeekRollover::with_clock(&store, on(2026, 10, 14))
            .is_week_rolling_over()
            .unwrap();
        assert_eq!(outcome, RolloverOutcome { week: 42, rolled_over: false });
    }

    #[test]
    fn year_boundary_rolls_back_to_week_one() {
        let store = Store::open_in_memory().unwrap();
        set_week(&store, 52);
        let rollover = WeekRollover::with_clock(&store, on(2024, 1, 1));

        let first = rollover.is_week_rolling_over().unwrap();
        assert_eq!(first, RolloverOutcome { week: 1, rolled_over: true });
        assert_eq!(rollover.current_week().unwrap(), 1);

        let second = rollover.is_week_rolling_over().unwrap();
        assert_eq!(second, RolloverOutcome { week: 1, rolled_over: false });
    }

    #[test]
    fn rollover_truncates_only_the_incoming_week() {
        let store = Store::open_in_memory().unwrap();
        store
            .conn()
            .execute_batch(
                "INSERT INTO country_bounds (id, name, min_x, min_y, max_x, max_y, geometry)
                     VALUES (1, 'X', 0, 0, 1, 1, '[]');
                 INSERT INTO tile (id, min_x, min_y, max_x, max_y, geometry, country_id)
                     VALUES (1, 0, 0, 500, 500, 'cell', 1);
                 INSERT INTO contributor (id, name) VALUES (1, 'ann');
                 INSERT INTO weekly_observation VALUES (10, 1, 1, 4);
                 INSERT INTO weekly_observation VALUES (11, 1, 1, 9);",
            )
            .unwrap();
        set_week(&store, 10);

        // 2025-03-10 is in ISO week 11.
        let outcome = WeekRollover::with_clock(&store, on(2025, 3, 10))
            .is_week_rolling_over()
            .unwrap();
        assert!(outcome.rolled_over);
        assert_eq!(outcome.week, 11);

        let weeks: Vec<i64> = store
            .conn()
            .prepare("SELECT week FROM weekly_observation ORDER BY week")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(weeks, vec![10]);
    }

    #[test]
    fn concurrent_checks_roll_over_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = crate::config::Config::for_database(dir.path().join("lb.sqlite"));
        {
            let store = Store::open(&config).unwrap();
            store.init_schema().unwrap();
            set_week(&store, 52);
        }

        let handles = (0..8)
            .map(|_| {
                let config = config.clone();
                std::thread::spawn(move || {
                    let store = Store::open(&config).unwrap();
                    WeekRollover::with_clock(&store, on(2024, 1, 2))
                        .is_week_rolling_over()
                        .unwrap()
                })
            })
            .collect::<Vec<_>>();
        let outcomes: Vec<RolloverOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(outcomes.iter().filter(|o| o.rolled_over).count(), 1);
        assert!(outcomes.iter().all(|o| o.week == 1));
    }
}
