use std::path::PathBuf;

use stumbler_leaderboard::{country, Config, Store};
use tempfile::TempDir;

pub fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/countries.geojson")
}

/// On-disk store with the fixture countries loaded.
pub fn seeded_store() -> (TempDir, Config) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = Config::for_database(dir.path().join("leaderboard.sqlite"));
    let store = Store::open(&config).expect("open store");
    store.init_schema().expect("schema");
    country::load_geojson(&store, fixture_path()).expect("load countries");
    (dir, config)
}

#[allow(dead_code)]
pub fn country_name(store: &Store, id: i64) -> String {
    country::country(store.conn(), id)
        .expect("query country")
        .expect("country exists")
        .name
}
