use std::sync::Arc;

use crate::config::ServerConfig;
use crate::service::MonitoringService;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (default account/region for the context extractor).
    pub config: Arc<ServerConfig>,
    /// Metric store, alarm registry and scheduler behind one facade.
    pub service: Arc<MonitoringService>,
}
