//! Runs one phone call per `/media-stream` WebSocket connection.

use super::realtime;
use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use callbridge_core::CallController;
use futures_util::{SinkExt, StreamExt, future};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

#[instrument(name = "call", skip_all, fields(call_id = %Uuid::new_v4()))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    info!("Caller connected");
    if let Err(e) = run_call(socket, &state).await {
        error!(error = ?e, "Call terminated with error.");
    }
    info!("Call finished.");
}

/// Bridges the caller socket to a fresh realtime session until either side ends.
async fn run_call(socket: WebSocket, state: &AppState) -> Result<()> {
    let session = realtime::session_config(&state.config);
    let (api, events) = realtime::open(&state.config, &session).await?;

    let (socket_tx, socket_rx) = socket.split();
    // Text frames only; the stream ends on the first close frame or socket error.
    let caller_in = socket_rx
        .take_while(|frame| {
            let open = match frame {
                Ok(Message::Close(_)) => false,
                Ok(_) => true,
                Err(e) => {
                    warn!(error = %e, "Error receiving from caller WebSocket");
                    false
                }
            };
            future::ready(open)
        })
        .filter_map(|frame| {
            future::ready(match frame {
                Ok(Message::Text(text)) => Some(text.as_str().to_owned()),
                _ => None,
            })
        });
    let caller_out = socket_tx
        .with(|text: String| future::ready(Ok::<_, axum::Error>(Message::Text(text.into()))));

    let controller = CallController::new(api, state.config.audio_format)
        .with_turn_detection(session.turn_detection_type())
        .with_greeting(state.config.greeting.clone());
    let summary = controller
        .run(Box::pin(caller_in), Box::pin(caller_out), events)
        .await?;

    info!(
        stream_sid = ?summary.stream_sid,
        items = summary.items,
        interruptions = summary.interruptions,
        caller = ?summary.caller_transcript,
        assistant = ?summary.assistant_transcript,
        "Call summary"
    );
    Ok(())
}
