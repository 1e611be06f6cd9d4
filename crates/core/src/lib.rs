//! Call-session core: bridges one telephony media stream to one realtime
//! session and decides who holds the floor.

pub mod controller;
pub mod link;
pub mod media_stream;
pub mod turn;

pub use controller::{
    COMMIT_DIGIT, CallController, CallSummary, LOG_EVENT_TYPES, Relay, subscribed_events,
};
pub use link::RealtimeLink;
pub use media_stream::{CallerCommand, CallerEvent};
pub use turn::{DeltaVerdict, TurnCommand, TurnState, TurnTaking};
