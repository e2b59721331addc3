//! Shared application state passed to every handler via Axum's `State` extractor.

use std::sync::Arc;

use crate::config::{Config, RedirectTemplate};
use crate::history::ClientLogStore;
use crate::models::StockModelMap;

/// Shared application state for the update server.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup.
    pub config: Arc<Config>,
    /// Stock prefix -> HomeKit model table, read-only after startup.
    pub models: Arc<StockModelMap>,
    /// Validated redirect URL template.
    pub redirect: RedirectTemplate,
    /// Per-client request history shown on `/log`.
    pub history: Arc<ClientLogStore>,
}

impl AppState {
    pub fn new(config: Config, models: StockModelMap, redirect: RedirectTemplate) -> Self {
        Self {
            config: Arc::new(config),
            models: Arc::new(models),
            redirect,
            history: Arc::new(ClientLogStore::new()),
        }
    }
}
