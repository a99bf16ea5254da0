//! Axum-based HTTP and WebSocket server.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::{get, patch, post, put},
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::routes;
use crate::state::GatewayState;
use crate::surfaces::surface_ws_handler;

/// Build the gateway router.
pub fn router(state: Arc<GatewayState>) -> Router {
    let permissive_cors = state
        .config
        .gateway
        .as_ref()
        .map(|g| g.permissive_cors)
        .unwrap_or(true);

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/api/shapes", get(routes::list_shapes).post(routes::create_shape))
        .route(
            "/api/shapes/{id}",
            patch(routes::update_shape).delete(routes::delete_shape),
        )
        .route("/api/shapes/{id}/snapshot", get(routes::get_snapshot))
        .route("/api/shapes/{id}/export.svg", get(routes::get_export_svg))
        .route("/api/selection", put(routes::put_selection))
        .route("/api/credentials", put(routes::put_credentials))
        .route("/api/make-real", post(routes::post_make_real))
        .route("/surfaces/{id}", get(routes::get_surface_document))
        .route("/surfaces/{id}/ws", get(surface_ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if permissive_cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Start the gateway and serve until Ctrl+C.
pub async fn start_gateway(state: Arc<GatewayState>, port: u16) -> anyhow::Result<()> {
    let bind_addr = state.config.gateway_bind();
    let app = router(state);

    let addr = format!("{bind_addr}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let shapes = state.board.read().await.shapes().len();

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "shapes": shapes,
        "surfaces": state.surfaces.count(),
        "pending_snapshots": state.snapshots.pending_count(),
        "provider": state.provider.id(),
    }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C, serving until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
