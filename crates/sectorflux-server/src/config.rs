//! Environment-driven server configuration.

use std::path::PathBuf;

const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
const DEFAULT_PORT: u16 = 8888;
const DEFAULT_DB_PATH: &str = "sectorflux.db";

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the upstream daemon (`OLLAMA_HOST`).
    pub ollama_host: String,
    /// Listen port (`SECTORFLUX_PORT`); out-of-range or unparsable values
    /// fall back to 8888.
    pub port: u16,
    /// Store path (`SECTORFLUX_DB`).
    pub db_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            ollama_host: std::env::var("OLLAMA_HOST")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string()),
            port: parse_port(std::env::var("SECTORFLUX_PORT").ok()),
            db_path: std::env::var("SECTORFLUX_DB")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
        }
    }
}

fn parse_port(raw: Option<String>) -> u16 {
    raw.and_then(|v| v.trim().parse::<u16>().ok())
        .filter(|&port| port > 0)
        .unwrap_or(DEFAULT_PORT)
}
