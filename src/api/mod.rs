//! REST API server module
//!
//! Provides an OpenAPI 3.1 compliant REST API for submitting media URLs,
//! following their progress and confirming delivery of fetched files.

use crate::{Config, MediaDownloader, Result};
use axum::{
    Router,
    http::HeaderValue,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Requests
/// - `POST /downloads` - Submit a media URL
/// - `GET /downloads/:id` - Request status
/// - `DELETE /downloads/:id` - Cancel a request
/// - `POST /downloads/:id/delivered` - Confirm delivery, deleting the artifact
/// - `DELETE /users/:user_id/downloads` - Cancel every request of a user
/// - `GET /users/:user_id/position` - Position of a user's first queued request
///
/// ## Queue
/// - `GET /queue/stats` - Queue snapshot
///
/// ## History
/// - `GET /history/:user_id` - Recent downloads of a user
/// - `GET /stats/platforms` - Per-platform counters
/// - `GET /users/:user_id/preferences` - Stored quality and duration defaults
/// - `PUT /users/:user_id/preferences` - Change them
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
/// - `GET /events` - Server-sent events stream
pub fn create_router(downloader: Arc<MediaDownloader>, config: Arc<Config>) -> Router {
    let state = AppState::new(downloader, config.clone());

    let router = Router::new()
        // Requests
        .route("/downloads", post(routes::submit_download))
        .route("/downloads/:id", get(routes::get_download))
        .route("/downloads/:id", delete(routes::cancel_download))
        .route("/downloads/:id/delivered", post(routes::confirm_delivery))
        .route(
            "/users/:user_id/downloads",
            delete(routes::cancel_user_downloads),
        )
        .route("/users/:user_id/position", get(routes::user_position))
        // Queue
        .route("/queue/stats", get(routes::queue_stats))
        // History
        .route("/history/:user_id", get(routes::get_user_history))
        .route("/stats/platforms", get(routes::platform_stats))
        .route(
            "/users/:user_id/preferences",
            get(routes::get_user_preferences).put(routes::update_user_preferences),
        )
        // System
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/events", get(routes::event_stream));

    // Merge Swagger UI routes if enabled in config (before applying state)
    let router = if config.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api/v1/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.with_state(state).layer(TraceLayer::new_for_http());

    if config.api.cors_enabled {
        let cors = build_cors_layer(&config.api.cors_origins);
        router.layer(cors)
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` (or an empty list) allows any origin.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until the server stops or fails.
///
/// # Example
///
/// ```no_run
/// use media_queue::{Config, MediaDownloader};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let downloader = Arc::new(MediaDownloader::open((*config).clone()).await?);
/// downloader.start().await;
///
/// // Start API server (blocks until shutdown)
/// media_queue::api::start_api_server(downloader, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(downloader: Arc<MediaDownloader>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.api.bind_address;

    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(downloader, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
