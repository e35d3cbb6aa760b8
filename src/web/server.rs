//! HTTP server implementation

use axum::{
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use super::handlers::{
    get_handler, prefix_handler, set_handler, snapshot_handler, stats_handler, AppState,
};

/// Build the application router
pub fn router(engine: AppState) -> Router {
    Router::new()
        .route("/kv/:key", get(get_handler).put(set_handler))
        .route("/prefix/:prefix", get(prefix_handler))
        .route("/admin/snapshot", post(snapshot_handler))
        .route("/stats", get(stats_handler))
        .layer(CorsLayer::permissive())
        .with_state(engine)
}

/// Serve until `shutdown` is cancelled
pub async fn run_web_server(
    addr: &str,
    engine: AppState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = router(engine);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP interface available at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}
