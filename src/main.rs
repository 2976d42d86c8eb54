use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use stumbler_leaderboard::{
    country, ConfigLoader, IngestOutcome, Leaderboard, Store, TileStore, WeekRollover,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Stumbler leaderboard tile and week maintenance")]
struct Cli {
    /// Config file tried before ~/.stumbler_leaderboard/db.json and /etc
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the schema if it does not exist
    Init,
    /// Load country boundaries from a WGS84 GeoJSON FeatureCollection
    LoadCountries { file: PathBuf },
    /// Get or create the tile covering a coordinate
    Tile {
        #[arg(allow_negative_numbers = true)]
        lon: f64,
        #[arg(allow_negative_numbers = true)]
        lat: f64,
    },
    /// Record observations by a contributor at a coordinate
    Record {
        name: String,
        #[arg(allow_negative_numbers = true)]
        lon: f64,
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, default_value_t = 1)]
        observations: u32,
    },
    /// Print the stored reporting week
    Week,
    /// Check for (and commit) a week rollover
    Rollover,
    /// Print the contributors of a week, busiest first
    Standings {
        /// Defaults to the stored current week
        #[arg(long)]
        week: Option<u32>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Delete all tiles, contributors and weekly data
    Reset {
        #[arg(long)]
        keep_countries: bool,
    },
}

fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut loader = ConfigLoader::standard();
    if let Some(path) = &cli.config {
        loader = loader.with_override(path);
    }
    // The log level comes from the config, so layer warnings go through a
    // scoped subscriber until the real one is installed.
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(env_filter("warn"))
        .finish();
    let config = tracing::subscriber::with_default(bootstrap, || loader.load())
        .context("Failed to load store configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(&config.logging.level))
        .init();

    let store = Store::open(&config).with_context(|| {
        format!("Failed to open store {}", config.database.path.display())
    })?;
    store.init_schema().context("Failed to initialise schema")?;

    match cli.command {
        Command::Init => {
            println!("Schema ready at {}", config.database.path.display());
        }
        Command::LoadCountries { file } => {
            let loaded = country::load_geojson(&store, &file)
                .with_context(|| format!("Failed to load countries from {}", file.display()))?;
            println!("Loaded {loaded} countries");
        }
        Command::Tile { lon, lat } => {
            let outcome = TileStore::new(&store)
                .get_or_create(lon, lat)
                .with_context(|| format!("Failed to get tile for ({lon}, {lat})"))?;
            let tile = TileStore::new(&store)
                .get(outcome.tile_id)?
                .context("Tile vanished after creation")?;
            let owner = country::country(store.conn(), tile.country_id)?;
            println!(
                "tile {} ({}) {} country={}",
                outcome.tile_id,
                if outcome.created { "created" } else { "existing" },
                tile.cell.to_ewkt(),
                owner.map(|c| c.name).unwrap_or_else(|| "?".into())
            );
        }
        Command::Record {
            name,
            lon,
            lat,
            observations,
        } => match Leaderboard::new(&store).record(&name, lon, lat, observations)? {
            IngestOutcome::Recorded {
                tile,
                week,
                rolled_over,
            } => println!(
                "recorded {observations} for {name} on tile {} in week {week}{}",
                tile.tile_id,
                if rolled_over { " (new week)" } else { "" }
            ),
            IngestOutcome::Skipped { reason } => println!("skipped: {reason}"),
        },
        Command::Week => {
            println!("{}", WeekRollover::new(&store).current_week()?);
        }
        Command::Rollover => {
            let outcome = WeekRollover::new(&store).is_week_rolling_over()?;
            println!(
                "week {} ({})",
                outcome.week,
                if outcome.rolled_over { "rolled over" } else { "unchanged" }
            );
        }
        Command::Standings { week, limit } => {
            let week = match week {
                Some(week) => week,
                None => WeekRollover::new(&store).current_week()?,
            };
            let standings = Leaderboard::new(&store).standings(week, limit)?;
            println!("{}", serde_json::to_string_pretty(&standings)?);
        }
        Command::Reset { keep_countries } => {
            store.reset(keep_countries).context("Reset failed")?;
            println!("Store reset");
        }
    }
    Ok(())
}
