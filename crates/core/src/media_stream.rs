//! Caller-side media stream protocol.
//!
//! The telephony provider talks JSON text frames tagged by `event`. Inbound
//! frames carry the stream identifier, base64 audio and lifecycle markers;
//! outbound frames push audio back, flush the provider's playback buffer, or
//! ask it to echo a named mark once playback reaches it.

use serde::{Deserialize, Serialize};

// --- Inbound ---

/// Audio encoding negotiated by the provider for this stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFormat {
    pub encoding: String,
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u32,
}

fn default_channels() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStart {
    pub stream_sid: String,
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub media_format: Option<MediaFormat>,
}

/// One inbound audio frame. `payload` is base64 and is never transcoded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundMedia {
    pub payload: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkPayload {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DtmfPayload {
    pub digit: String,
}

/// A frame received from the caller's media stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum CallerEvent {
    Connected,
    Start { start: StreamStart },
    Media { media: InboundMedia },
    Stop,
    /// Playback reached a mark we sent earlier.
    Mark {
        #[serde(default)]
        mark: Option<MarkPayload>,
    },
    Dtmf { dtmf: DtmfPayload },
    #[serde(other)]
    Unknown,
}

impl CallerEvent {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

// --- Outbound ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMedia {
    pub payload: String,
}

/// A frame sent back to the caller's media stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum CallerCommand {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
    /// Drops whatever audio the provider still has queued for playback.
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: MarkPayload,
    },
}

impl CallerCommand {
    pub fn media(stream_sid: &str, payload: impl Into<String>) -> Self {
        Self::Media {
            stream_sid: stream_sid.to_owned(),
            media: OutboundMedia {
                payload: payload.into(),
            },
        }
    }

    pub fn clear(stream_sid: &str) -> Self {
        Self::Clear {
            stream_sid: stream_sid.to_owned(),
        }
    }

    pub fn mark(stream_sid: &str, name: impl Into<String>) -> Self {
        Self::Mark {
            stream_sid: stream_sid.to_owned(),
            mark: MarkPayload { name: name.into() },
        }
    }

    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
