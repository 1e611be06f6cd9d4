//! Shared Application State

use crate::config::Config;

/// The shared application state, created once at startup and passed to all handlers.
/// Every call opens its own realtime session, so nothing here is per-call.
pub struct AppState {
    pub config: Config,
}
