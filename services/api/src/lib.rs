//! Callbridge API Library Crate
//!
//! This library contains the web service that bridges phone calls to the
//! realtime voice backend: configuration, application state, telephony
//! webhooks, the media-stream WebSocket, and routing. The `api` binary is a
//! thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
