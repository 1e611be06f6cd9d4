//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the telephony webhooks, the media-stream WebSocket endpoint, and
//! the OpenAPI documentation.

use crate::{
    handlers,
    models::{ErrorResponse, ServiceMessage, StatusResponse},
    state::AppState,
    ws::media_stream_handler,
};

use axum::{Router, routing::get};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::index,
        handlers::incoming_call,
        handlers::call_status,
    ),
    components(
        schemas(ServiceMessage, StatusResponse, ErrorResponse)
    ),
    tags(
        (name = "Callbridge API", description = "Telephony webhooks for the realtime voice bridge")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/", get(handlers::index))
        .route(
            "/incoming",
            get(handlers::incoming_call).post(handlers::incoming_call),
        )
        .route(
            "/status",
            get(handlers::call_status).post(handlers::call_status),
        )
        .route("/media-stream", get(media_stream_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
