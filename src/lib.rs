pub mod calendar;
pub mod config;
pub mod country;
pub mod error;
pub mod leaderboard;
pub mod rollover;
pub mod spatial;
pub mod store;
pub mod tile;

pub use config::{Config, ConfigLoader};
pub use country::{CountryResolver, Resolution, ResolutionTier};
pub use error::{LeaderboardError, Result};
pub use leaderboard::{IngestOutcome, Leaderboard, Standing};
pub use rollover::{RolloverOutcome, WeekRollover};
pub use spatial::{snap, Coordinate, GridCell};
pub use store::Store;
pub use tile::{TileOutcome, TileStore};
