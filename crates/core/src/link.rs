use async_trait::async_trait;
use openai_realtime::{RealtimeApi, RealtimeError};
use serde_json::Value;

/// The half of a realtime session the call controller writes to.
///
/// Inbound backend events reach the controller through the event bus, so the
/// link only needs the outbound operations.
#[async_trait]
pub trait RealtimeLink: Send + Sync {
    /// Frames and queues one client event, returning the framed event.
    fn send(&self, event_type: &str, payload: Value) -> Result<Value, RealtimeError>;

    fn is_connected(&self) -> bool;

    /// Closes the session. Returns `false` when it was already closed.
    async fn disconnect(&self) -> bool;
}

#[async_trait]
impl RealtimeLink for RealtimeApi {
    fn send(&self, event_type: &str, payload: Value) -> Result<Value, RealtimeError> {
        RealtimeApi::send(self, event_type, payload)
    }

    fn is_connected(&self) -> bool {
        RealtimeApi::is_connected(self)
    }

    async fn disconnect(&self) -> bool {
        RealtimeApi::disconnect(self).await
    }
}
