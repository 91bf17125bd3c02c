//! OpenAPI documentation and schema generation
//!
//! This module defines the OpenAPI specification for the media-queue REST API
//! using utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the media-queue REST API
///
/// Served at:
/// - `/api/v1/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "media-queue REST API",
        version = "0.1.0",
        description = "Submit media URLs, follow their progress and confirm delivery of fetched files",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:6790/api/v1", description = "Local development server")
    ),
    paths(
        // Requests
        crate::api::routes::submit_download,
        crate::api::routes::get_download,
        crate::api::routes::cancel_download,
        crate::api::routes::confirm_delivery,
        crate::api::routes::cancel_user_downloads,
        crate::api::routes::user_position,

        // Queue
        crate::api::routes::queue_stats,

        // History
        crate::api::routes::get_user_history,
        crate::api::routes::platform_stats,
        crate::api::routes::get_user_preferences,
        crate::api::routes::update_user_preferences,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::RequestId,
        crate::types::UserId,
        crate::types::RequestState,
        crate::types::Artifact,
        crate::types::RequestResult,
        crate::types::Submission,
        crate::types::RequestView,
        crate::types::UserLoad,
        crate::types::QueueSnapshot,
        crate::types::CompletionRecord,
        crate::types::ArtifactRemoval,
        crate::types::Event,
        crate::types::HistoryEntry,
        crate::types::PlatformStats,
        crate::types::UserPreferences,
        crate::types::PreferencesUpdate,
        crate::types::DrainReport,
        crate::platforms::Platform,

        // Errors
        crate::error::FailureKind,
        crate::error::FetchError,
        crate::error::ApiError,
        crate::error::ErrorDetail,

        // Route request/response types
        crate::api::routes::SubmitResponse,
        crate::api::routes::HistoryQuery,
        crate::api::routes::HistoryResponse,
        crate::api::routes::CancelUserResponse,
    )),
    tags(
        (name = "downloads", description = "Submit, inspect, cancel and confirm requests"),
        (name = "queue", description = "Queue-wide statistics"),
        (name = "history", description = "Finished requests and user preferences kept in the history database"),
        (name = "system", description = "Health, OpenAPI and the event stream")
    )
)]
pub struct ApiDoc;
