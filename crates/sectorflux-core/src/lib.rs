//! Persistent store and telemetry extraction for SectorFlux.

mod error;
mod store;
pub mod telemetry;

pub use error::SectorFluxError;
pub use store::Store;

/// Result type for SectorFlux operations.
pub type Result<T> = std::result::Result<T, SectorFluxError>;
