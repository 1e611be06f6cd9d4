//! Client-side plumbing for the OpenAI Realtime API.
//!
//! - [`utils`]: base64/PCM16 codecs and event identifiers.
//! - [`event_bus`]: the publish/subscribe registry every other piece hangs off.
//! - [`transport`]: one websocket session to the backend ([`RealtimeApi`]).
//! - [`conversation`]: rebuilds conversation items from delta events.
//! - [`session`]: the `session.update` payload.

pub mod conversation;
pub mod error;
pub mod event_bus;
pub mod session;
pub mod transport;
pub mod utils;

pub use conversation::{Conversation, ItemDelta, ProcessedEvent};
pub use error::{RealtimeError, Result};
pub use event_bus::{BusEvent, EventBus, Handler};
pub use session::{SessionConfig, ToolDefinition, TurnDetection};
pub use transport::RealtimeApi;

pub use openai_realtime_types as types;
