//! WebSocket Call Handling
//!
//! - `session`: upgrades `/media-stream` and runs one call per connection.
//! - `realtime`: opens and configures the realtime backend session for a call.

pub mod realtime;
pub mod session;

pub use session::media_stream_handler;
