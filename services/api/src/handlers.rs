//! Axum Handlers for the telephony webhooks
//!
//! The provider calls `/incoming` when a call arrives and gets back a
//! call-control document that connects the call audio to `/media-stream`.
//! It uses `utoipa` doc comments to generate OpenAPI documentation.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    models::{ErrorResponse, ServiceMessage, StatusResponse},
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Call-control document that greets the caller and opens the media stream.
pub fn connect_stream_document(host: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            "<Response>",
            "<Say>Please wait while we connect your call to the A. I. voice assistant</Say>",
            r#"<Pause length="1"/>"#,
            "<Say>O.K. you can start talking!</Say>",
            r#"<Connect><Stream url="wss://{}/media-stream"/></Connect>"#,
            "</Response>"
        ),
        escape_xml(host)
    )
}

/// Host the caller should stream to: the configured public host, else the
/// request's `Host` header without its port.
fn stream_host(state: &AppState, headers: &HeaderMap) -> Option<String> {
    if let Some(host) = &state.config.public_host {
        return Some(host.clone());
    }
    let host = headers.get(header::HOST)?.to_str().ok()?;
    let hostname = host.split(':').next().unwrap_or(host);
    (!hostname.is_empty()).then(|| hostname.to_string())
}

/// Liveness message.
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Server is running", body = ServiceMessage)
    )
)]
pub async fn index() -> Json<ServiceMessage> {
    Json(ServiceMessage {
        message: "Media Stream Server is running!".to_string(),
    })
}

/// Answer an incoming call by connecting it to the media stream.
#[utoipa::path(
    method(get, post),
    path = "/incoming",
    responses(
        (status = 200, description = "Call-control document", content_type = "application/xml", body = String),
        (status = 400, description = "No host to stream to", body = ErrorResponse)
    )
)]
pub async fn incoming_call(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let host = stream_host(&state, &headers)
        .ok_or_else(|| ApiError::BadRequest("Host header is required".to_string()))?;
    info!(%host, "Answering incoming call");
    Ok((
        [(header::CONTENT_TYPE, "application/xml")],
        connect_stream_document(&host),
    ))
}

/// Status callback from the telephony provider.
#[utoipa::path(
    method(get, post),
    path = "/status",
    responses(
        (status = 200, description = "Acknowledged", body = StatusResponse)
    )
)]
pub async fn call_status() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
    })
}
