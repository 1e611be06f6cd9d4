/// Failures surfaced by the realtime client.
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    /// Not connected, already connected, or the handshake/socket failed.
    #[error("Connection error: {0}")]
    Connection(String),
    /// Malformed payload or event; nothing was mutated.
    #[error("Validation error: {0}")]
    Validation(String),
    /// An item, response, handler or tool referenced by id is not registered.
    #[error("Not found: {0}")]
    NotFound(String),
    /// The conversation has no processor for this event type.
    #[error("Unsupported event type \"{0}\"")]
    UnsupportedEvent(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = RealtimeError> = std::result::Result<T, E>;
