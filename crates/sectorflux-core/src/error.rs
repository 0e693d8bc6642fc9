//! Error types for SectorFlux.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SectorFluxError {
    /// Store could not be opened or its schema created. Fatal at startup.
    #[error("Failed to initialize store: {0}")]
    Init(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
