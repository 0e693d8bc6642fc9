//! Shared application state.

use std::sync::Arc;

use sectorflux_core::{SectorFluxError, Store};
use tokio::sync::mpsc;

use crate::broadcaster::DashboardBroadcaster;
use crate::config::Config;
use crate::proxy::ProxyEngine;

/// Shared application state.
pub struct AppState {
    pub store: Arc<Store>,
    pub proxy: ProxyEngine,
    pub broadcaster: Arc<DashboardBroadcaster>,
    pub config: Config,
    /// Signals the serve loop to stop; used by `POST /api/shutdown`.
    pub shutdown_tx: mpsc::Sender<()>,
}

impl AppState {
    pub fn new(config: Config, shutdown_tx: mpsc::Sender<()>) -> sectorflux_core::Result<Self> {
        let store = Arc::new(Store::open(&config.db_path)?);
        let proxy = ProxyEngine::new(store.clone(), config.ollama_host.clone())
            .map_err(|e| SectorFluxError::Init(e.to_string()))?;
        let broadcaster = Arc::new(
            DashboardBroadcaster::new().map_err(|e| SectorFluxError::Init(e.to_string()))?,
        );

        Ok(Self {
            store,
            proxy,
            broadcaster,
            config,
            shutdown_tx,
        })
    }
}
