//! Server events that change conversation state.
//!
//! The enum is closed on purpose: the aggregator dispatches over it, and any
//! `type` not listed in [`ConversationEvent::TYPES`] is reported as
//! unsupported rather than dropped.

use crate::item::{ContentPart, Item};
use crate::response::ResponseResource;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ConversationEvent {
    #[serde(rename = "conversation.item.created")]
    ItemCreated { event_id: String, item: Item },
    #[serde(rename = "conversation.item.truncated")]
    ItemTruncated {
        event_id: String,
        item_id: String,
        #[serde(default)]
        content_index: usize,
        audio_end_ms: u64,
    },
    #[serde(rename = "conversation.item.deleted")]
    ItemDeleted { event_id: String, item_id: String },
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputAudioTranscriptionCompleted {
        event_id: String,
        item_id: String,
        #[serde(default)]
        content_index: usize,
        #[serde(default)]
        transcript: String,
    },
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {
        event_id: String,
        item_id: String,
        audio_start_ms: u64,
    },
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {
        event_id: String,
        item_id: String,
        audio_end_ms: u64,
    },
    #[serde(rename = "response.created")]
    ResponseCreated {
        event_id: String,
        response: ResponseResource,
    },
    #[serde(rename = "response.done")]
    ResponseDone {
        event_id: String,
        response: ResponseResource,
    },
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        event_id: String,
        response_id: String,
        item: Item,
    },
    #[serde(rename = "response.output_item.done")]
    OutputItemDone {
        event_id: String,
        response_id: String,
        item: Item,
    },
    #[serde(rename = "response.content_part.added")]
    ContentPartAdded {
        event_id: String,
        item_id: String,
        part: ContentPart,
    },
    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta {
        event_id: String,
        item_id: String,
        #[serde(default)]
        content_index: usize,
        delta: String,
    },
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        event_id: String,
        item_id: String,
        #[serde(default)]
        content_index: usize,
        delta: String,
    },
    #[serde(rename = "response.text.delta")]
    TextDelta {
        event_id: String,
        item_id: String,
        #[serde(default)]
        content_index: usize,
        delta: String,
    },
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        event_id: String,
        item_id: String,
        delta: String,
    },
}

impl ConversationEvent {
    /// Every `type` value this enum deserializes.
    pub const TYPES: &'static [&'static str] = &[
        "conversation.item.created",
        "conversation.item.truncated",
        "conversation.item.deleted",
        "conversation.item.input_audio_transcription.completed",
        "input_audio_buffer.speech_started",
        "input_audio_buffer.speech_stopped",
        "response.created",
        "response.done",
        "response.output_item.added",
        "response.output_item.done",
        "response.content_part.added",
        "response.audio_transcript.delta",
        "response.audio.delta",
        "response.text.delta",
        "response.function_call_arguments.delta",
    ];

    pub fn handles(event_type: &str) -> bool {
        Self::TYPES.contains(&event_type)
    }

    pub fn event_id(&self) -> &str {
        match self {
            ConversationEvent::ItemCreated { event_id, .. }
            | ConversationEvent::ItemTruncated { event_id, .. }
            | ConversationEvent::ItemDeleted { event_id, .. }
            | ConversationEvent::InputAudioTranscriptionCompleted { event_id, .. }
            | ConversationEvent::SpeechStarted { event_id, .. }
            | ConversationEvent::SpeechStopped { event_id, .. }
            | ConversationEvent::ResponseCreated { event_id, .. }
            | ConversationEvent::ResponseDone { event_id, .. }
            | ConversationEvent::OutputItemAdded { event_id, .. }
            | ConversationEvent::OutputItemDone { event_id, .. }
            | ConversationEvent::ContentPartAdded { event_id, .. }
            | ConversationEvent::AudioTranscriptDelta { event_id, .. }
            | ConversationEvent::AudioDelta { event_id, .. }
            | ConversationEvent::TextDelta { event_id, .. }
            | ConversationEvent::FunctionCallArgumentsDelta { event_id, .. } => event_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_every_listed_type_is_recognised() {
        assert_eq!(ConversationEvent::TYPES.len(), 15);
        assert!(ConversationEvent::handles("response.audio.delta"));
        assert!(!ConversationEvent::handles("session.updated"));
        assert!(!ConversationEvent::handles("rate_limits.updated"));
    }

    #[test]
    fn test_deserialize_speech_started() {
        let event: ConversationEvent = serde_json::from_value(json!({
            "event_id": "event_1",
            "type": "input_audio_buffer.speech_started",
            "audio_start_ms": 1000,
            "item_id": "item_1"
        }))
        .unwrap();

        match event {
            ConversationEvent::SpeechStarted {
                item_id,
                audio_start_ms,
                ..
            } => {
                assert_eq!(item_id, "item_1");
                assert_eq!(audio_start_ms, 1000);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_deserialize_response_created() {
        let event: ConversationEvent = serde_json::from_value(json!({
            "event_id": "event_2",
            "type": "response.created",
            "response": {"object": "realtime.response", "id": "resp_1", "status": "in_progress", "output": []}
        }))
        .unwrap();
        assert_eq!(event.event_id(), "event_2");
        match event {
            ConversationEvent::ResponseCreated { response, .. } => {
                assert_eq!(response.id, "resp_1");
                assert!(response.output_ids().is_empty());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
