pub mod api;
pub mod app_state;
pub mod config;
pub mod store;
pub mod stream;

use axum::Router;
use axum::extract::Extension;
use axum::routing::{get, post};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::Any;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

//
// Re-export
//
pub use api::{ApiResponse, LiveStream};
pub use app_state::AppState;
pub use config::Config;
pub use store::{Overlay, OverlayKind, RecordStore, StreamSetting};
pub use stream::{FfmpegTool, MediaTool, StreamError, StreamInfo, StreamSupervisor};

/// Builds the HTTP application around `state`.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/streams", get(api::list_streams).post(api::create_stream))
        .route("/streams/validate", post(api::validate_stream))
        .route("/streams/probe", post(api::probe_stream))
        .route(
            "/streams/{id}",
            get(api::get_stream)
                .put(api::update_stream)
                .delete(api::delete_stream),
        )
        .route("/streams/{id}/start", post(api::start_stream_setting))
        .route("/streams/{id}/stop", post(api::stop_stream_setting))
        .route("/live", get(api::list_live).post(api::start_live))
        .route("/live/{id}", get(api::get_live).delete(api::stop_live))
        .route("/overlays", get(api::list_overlays).post(api::create_overlay))
        .route(
            "/overlays/{id}",
            get(api::get_overlay)
                .put(api::update_overlay)
                .delete(api::delete_overlay),
        );

    Router::new()
        .nest("/api", api)
        .route("/hls/{filename}", get(api::serve_hls))
        .layer(axum::middleware::from_fn(api::log_request_errors))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(Extension(state))
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(?error, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let workspace = PathBuf::from(&config.workspace);

    let tool = FfmpegTool::from_config(&config);
    let supervisor = Arc::new(StreamSupervisor::new(tool, config.stop_grace()));
    let state = AppState::new(&workspace, supervisor, config.liveness_interval()).await?;

    let app = router(state.clone());

    let addr = format!("0.0.0.0:{}", config.listen_on_port);
    info!(workspace = %workspace.display(), "API listening on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Stopping active streams");
    state.supervisor.cleanup_all().await;
    Ok(())
}
