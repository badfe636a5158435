use crate::config::AppConfig;
use crate::query::QueryEngine;
use crate::query::collaborators::FeatureLayer;
use std::sync::Arc;

/// Shared application state for the web server
pub struct AppState {
    pub config: AppConfig,
    pub engine: Arc<QueryEngine>,
    // Server-side view of the map: which countries the last answer highlighted
    pub layer: FeatureLayer,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(config: AppConfig, engine: Arc<QueryEngine>, layer: FeatureLayer) -> Self {
        Self {
            config,
            engine,
            layer,
            startup_time: chrono::Utc::now(),
        }
    }
}
