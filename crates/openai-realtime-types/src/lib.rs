//! Wire types for the OpenAI Realtime API.
//!
//! Everything here is plain serde data: conversation items and their content
//! parts, response resources, audio formats, and the closed set of server
//! events the conversation aggregator understands. Behaviour lives in the
//! `openai-realtime` crate.

pub mod audio;
pub mod events;
pub mod item;
pub mod response;

pub use audio::AudioFormat;
pub use events::ConversationEvent;
pub use item::{
    ContentPart, ContentType, ConversationItem, FormattedItem, FormattedTool, Item, ItemKind,
    ItemRole, ItemStatus,
};
pub use response::{ResponseRecord, ResponseResource, ResponseStatus};
