use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = LeaderboardError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum LeaderboardError {
    #[error("invalid coordinate (lon={lon}, lat={lat}): {reason}")]
    InvalidInput {
        lon: f64,
        lat: f64,
        reason: &'static str,
    },

    #[error("no country could be resolved for {detail}")]
    NoCountryAvailable { detail: String },

    #[error("country table is empty; load a boundary dataset first")]
    CountryLookupExhausted,

    #[error("store busy after {attempts} attempts: {source}")]
    TransientStore {
        attempts: u32,
        #[source]
        source: rusqlite::Error,
    },

    #[error("no valid configuration found (searched: {})", display_paths(.searched))]
    ConfigurationMissing { searched: Vec<PathBuf> },

    #[error("contributor name must not be empty")]
    InvalidContributor,

    #[error("country dataset {origin}: {message}")]
    Dataset { origin: String, message: String },

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LeaderboardError {
    /// Spatial-resolution failures: log, skip the tile, keep serving.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LeaderboardError::NoCountryAvailable { .. } | LeaderboardError::CountryLookupExhausted
        )
    }
}

/// SQLite reports contention as busy/locked; both clear up on their own.
pub(crate) fn is_transient(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, _) => matches!(
            code.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        ),
        _ => false,
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
