// Axum start-up code. The API is the only surface: map rendering and message
// display belong to whatever client consumes it.

pub mod handlers;
pub mod routes;
pub mod state;

use crate::config::WebConfig;
use state::AppState;
use std::error::Error;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub async fn run_server(
    config: WebConfig,
    state: Arc<AppState>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let app = routes::api_routes().with_state(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
