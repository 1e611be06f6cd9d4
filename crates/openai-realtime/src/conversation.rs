//! Rebuilds conversation items from the realtime event stream.
//!
//! Items are created by `conversation.item.created` and then mutated by the
//! deltas that reference them. Speech boundaries and input transcriptions may
//! arrive before the item they belong to; those are parked in queues keyed by
//! item id and attached when the item shows up.

use crate::error::{RealtimeError, Result};
use crate::utils;
use openai_realtime_types::{
    AudioFormat, ConversationEvent, ConversationItem, FormattedTool, Item,
    ItemKind, ItemRole, ItemStatus, ResponseRecord, ResponseResource,
};
use serde::Deserialize;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;

/// What an event changed on the affected item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemDelta {
    Transcript(String),
    Audio(Vec<u8>),
    Text(String),
    Arguments(String),
}

/// Result of processing one event.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedEvent<'a> {
    /// The affected item. Owned only when the item was just deleted.
    pub item: Option<Cow<'a, ConversationItem>>,
    pub delta: Option<ItemDelta>,
}

impl<'a> ProcessedEvent<'a> {
    fn none() -> Self {
        Self {
            item: None,
            delta: None,
        }
    }

    fn item(item: &'a ConversationItem) -> Self {
        Self {
            item: Some(Cow::Borrowed(item)),
            delta: None,
        }
    }

    fn with_delta(item: &'a ConversationItem, delta: ItemDelta) -> Self {
        Self {
            item: Some(Cow::Borrowed(item)),
            delta: Some(delta),
        }
    }
}

#[derive(Debug, Default)]
struct QueuedSpeech {
    audio_start_ms: u64,
    audio_end_ms: Option<u64>,
    audio: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
pub struct Conversation {
    format: AudioFormat,
    item_lookup: HashMap<String, ConversationItem>,
    items: Vec<String>,
    response_lookup: HashMap<String, ResponseRecord>,
    responses: Vec<String>,
    queued_speech_items: HashMap<String, QueuedSpeech>,
    queued_transcript_items: HashMap<String, String>,
    queued_input_audio: Option<Vec<u8>>,
}

fn item_not_found(context: &str, item_id: &str) -> RealtimeError {
    RealtimeError::NotFound(format!("{}: Item \"{}\" not found", context, item_id))
}

impl Conversation {
    /// A conversation whose audio is in `format`.
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            ..Default::default()
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Forgets every item, response and queued segment.
    pub fn clear(&mut self) {
        *self = Self::new(self.format);
    }

    /// Parks committed input audio for the next user message that is created.
    pub fn queue_input_audio(&mut self, input_audio: Vec<u8>) {
        self.queued_input_audio = Some(input_audio);
    }

    pub fn get_item(&self, id: &str) -> Option<&ConversationItem> {
        self.item_lookup.get(id)
    }

    /// Items in creation order.
    pub fn items(&self) -> Vec<&ConversationItem> {
        self.items
            .iter()
            .filter_map(|id| self.item_lookup.get(id))
            .collect()
    }

    pub fn get_response(&self, id: &str) -> Option<&ResponseRecord> {
        self.response_lookup.get(id)
    }

    pub fn responses(&self) -> Vec<&ResponseRecord> {
        self.responses
            .iter()
            .filter_map(|id| self.response_lookup.get(id))
            .collect()
    }

    /// Validates a raw server event and applies it.
    ///
    /// `input_audio` is the caller's accumulated input buffer; it is only read
    /// by `input_audio_buffer.speech_stopped`.
    pub fn process_event(
        &mut self,
        event: &Value,
        input_audio: Option<&[u8]>,
    ) -> Result<ProcessedEvent<'_>> {
        let fields = event
            .as_object()
            .ok_or_else(|| RealtimeError::Validation("Event must be a JSON object".to_string()))?;
        if !fields.contains_key("event_id") {
            return Err(RealtimeError::Validation(
                "Missing \"event_id\" on event".to_string(),
            ));
        }
        let event_type = fields
            .get("type")
            .ok_or_else(|| RealtimeError::Validation("Missing \"type\" on event".to_string()))?
            .as_str()
            .ok_or_else(|| RealtimeError::Validation("\"type\" must be a string".to_string()))?;
        if !ConversationEvent::handles(event_type) {
            return Err(RealtimeError::UnsupportedEvent(event_type.to_string()));
        }

        let typed = ConversationEvent::deserialize(event).map_err(|e| {
            RealtimeError::Validation(format!("Malformed \"{}\" event: {}", event_type, e))
        })?;
        self.process(&typed, input_audio)
    }

    /// Applies an already typed event.
    pub fn process(
        &mut self,
        event: &ConversationEvent,
        input_audio: Option<&[u8]>,
    ) -> Result<ProcessedEvent<'_>> {
        match event {
            ConversationEvent::ItemCreated { item, .. } => self.item_created(item),
            ConversationEvent::ItemTruncated {
                item_id,
                audio_end_ms,
                ..
            } => self.item_truncated(item_id, *audio_end_ms),
            ConversationEvent::ItemDeleted { item_id, .. } => self.item_deleted(item_id),
            ConversationEvent::InputAudioTranscriptionCompleted {
                item_id,
                content_index,
                transcript,
                ..
            } => self.input_transcription_completed(item_id, *content_index, transcript),
            ConversationEvent::SpeechStarted {
                item_id,
                audio_start_ms,
                ..
            } => {
                self.queued_speech_items.insert(
                    item_id.clone(),
                    QueuedSpeech {
                        audio_start_ms: *audio_start_ms,
                        ..Default::default()
                    },
                );
                Ok(ProcessedEvent::none())
            }
            ConversationEvent::SpeechStopped {
                item_id,
                audio_end_ms,
                ..
            } => {
                self.speech_stopped(item_id, *audio_end_ms, input_audio);
                Ok(ProcessedEvent::none())
            }
            ConversationEvent::ResponseCreated { response, .. } => {
                if !self.response_lookup.contains_key(&response.id) {
                    self.response_lookup
                        .insert(response.id.clone(), ResponseRecord::from(response));
                    self.responses.push(response.id.clone());
                }
                Ok(ProcessedEvent::none())
            }
            ConversationEvent::ResponseDone { response, .. } => {
                self.response_done(response)?;
                Ok(ProcessedEvent::none())
            }
            ConversationEvent::OutputItemAdded {
                response_id, item, ..
            } => {
                let response = self.response_lookup.get_mut(response_id).ok_or_else(|| {
                    RealtimeError::NotFound(format!(
                        "response.output_item.added: Response \"{}\" not found",
                        response_id
                    ))
                })?;
                response.output.push(item.id.clone());
                Ok(ProcessedEvent::none())
            }
            ConversationEvent::OutputItemDone { item, .. } => {
                let found = self
                    .item_lookup
                    .get_mut(&item.id)
                    .ok_or_else(|| item_not_found("response.output_item.done", &item.id))?;
                if let Some(status) = item.status {
                    found.status = status;
                }
                Ok(ProcessedEvent::item(found))
            }
            ConversationEvent::ContentPartAdded { item_id, part, .. } => {
                let item = self
                    .item_lookup
                    .get_mut(item_id)
                    .ok_or_else(|| item_not_found("response.content_part.added", item_id))?;
                item.content.push(part.clone());
                Ok(ProcessedEvent::item(item))
            }
            ConversationEvent::AudioTranscriptDelta {
                item_id,
                content_index,
                delta,
                ..
            } => {
                let item = self
                    .item_lookup
                    .get_mut(item_id)
                    .ok_or_else(|| item_not_found("response.audio_transcript.delta", item_id))?;
                if let Some(part) = item.content.get_mut(*content_index) {
                    part.transcript
                        .get_or_insert_with(String::new)
                        .push_str(delta);
                }
                item.formatted.transcript.push_str(delta);
                Ok(ProcessedEvent::with_delta(
                    item,
                    ItemDelta::Transcript(delta.clone()),
                ))
            }
            ConversationEvent::AudioDelta { item_id, delta, .. } => {
                let item = self
                    .item_lookup
                    .get_mut(item_id)
                    .ok_or_else(|| item_not_found("response.audio.delta", item_id))?;
                let samples = utils::base64_to_bytes(delta)?;
                item.formatted.audio.extend_from_slice(&samples);
                Ok(ProcessedEvent::with_delta(item, ItemDelta::Audio(samples)))
            }
            ConversationEvent::TextDelta {
                item_id,
                content_index,
                delta,
                ..
            } => {
                let item = self
                    .item_lookup
                    .get_mut(item_id)
                    .ok_or_else(|| item_not_found("response.text.delta", item_id))?;
                if let Some(part) = item.content.get_mut(*content_index) {
                    part.text.get_or_insert_with(String::new).push_str(delta);
                }
                item.formatted.text.push_str(delta);
                Ok(ProcessedEvent::with_delta(item, ItemDelta::Text(delta.clone())))
            }
            ConversationEvent::FunctionCallArgumentsDelta { item_id, delta, .. } => {
                let item = self.item_lookup.get_mut(item_id).ok_or_else(|| {
                    item_not_found("response.function_call_arguments.delta", item_id)
                })?;
                item.arguments.push_str(delta);
                if let Some(tool) = item.formatted.tool.as_mut() {
                    tool.arguments.push_str(delta);
                }
                Ok(ProcessedEvent::with_delta(
                    item,
                    ItemDelta::Arguments(delta.clone()),
                ))
            }
        }
    }

    fn item_created(&mut self, item: &Item) -> Result<ProcessedEvent<'_>> {
        if self.item_lookup.contains_key(&item.id) {
            return Ok(ProcessedEvent::item(&self.item_lookup[&item.id]));
        }

        let mut created = ConversationItem::from_item(item.clone());
        if let Some(speech) = self.queued_speech_items.remove(&created.id) {
            if let Some(audio) = speech.audio {
                created.formatted.audio = audio;
            }
        }
        created.formatted.text = created
            .content
            .iter()
            .filter(|part| part.is_text())
            .filter_map(|part| part.text.as_deref())
            .collect();
        if let Some(transcript) = self.queued_transcript_items.remove(&created.id) {
            created.formatted.transcript = transcript;
        }

        match created.kind {
            ItemKind::Message if created.role == Some(ItemRole::User) => {
                created.status = ItemStatus::Completed;
                if let Some(audio) = self.queued_input_audio.take() {
                    created.formatted.audio = audio;
                }
            }
            ItemKind::Message => created.status = ItemStatus::InProgress,
            ItemKind::FunctionCall => {
                created.formatted.tool = Some(FormattedTool {
                    name: created.name.clone().unwrap_or_default(),
                    call_id: created.call_id.clone().unwrap_or_default(),
                    arguments: String::new(),
                });
                created.status = ItemStatus::InProgress;
            }
            ItemKind::FunctionCallOutput => {
                created.status = ItemStatus::Completed;
                created.formatted.output = Some(created.output.clone().unwrap_or_default());
            }
        }

        let id = created.id.clone();
        self.items.push(id.clone());
        let stored = self.item_lookup.entry(id).or_insert(created);
        Ok(ProcessedEvent::item(stored))
    }

    fn item_truncated(&mut self, item_id: &str, audio_end_ms: u64) -> Result<ProcessedEvent<'_>> {
        let end = self.format.ms_to_byte_offset(audio_end_ms);
        let item = self
            .item_lookup
            .get_mut(item_id)
            .ok_or_else(|| item_not_found("item.truncated", item_id))?;
        item.formatted.transcript.clear();
        item.formatted.audio.truncate(end);
        Ok(ProcessedEvent::item(item))
    }

    fn item_deleted(&mut self, item_id: &str) -> Result<ProcessedEvent<'_>> {
        let item = self
            .item_lookup
            .remove(item_id)
            .ok_or_else(|| item_not_found("item.deleted", item_id))?;
        self.items.retain(|id| id != item_id);
        Ok(ProcessedEvent {
            item: Some(Cow::Owned(item)),
            delta: None,
        })
    }

    fn input_transcription_completed(
        &mut self,
        item_id: &str,
        content_index: usize,
        transcript: &str,
    ) -> Result<ProcessedEvent<'_>> {
        match self.item_lookup.get_mut(item_id) {
            None => {
                self.queued_transcript_items
                    .insert(item_id.to_owned(), transcript.to_owned());
                Ok(ProcessedEvent::none())
            }
            Some(item) => {
                if let Some(part) = item.content.get_mut(content_index) {
                    part.transcript = Some(transcript.to_owned());
                }
                item.formatted.transcript = transcript.to_owned();
                Ok(ProcessedEvent::with_delta(
                    item,
                    ItemDelta::Transcript(transcript.to_owned()),
                ))
            }
        }
    }

    fn speech_stopped(&mut self, item_id: &str, audio_end_ms: u64, input_audio: Option<&[u8]>) {
        let format = self.format;
        // A stop without a matching start is tolerated.
        let Some(speech) = self.queued_speech_items.get_mut(item_id) else {
            return;
        };
        speech.audio_end_ms = Some(audio_end_ms);
        if let Some(buffer) = input_audio.filter(|b| !b.is_empty()) {
            let end = format.ms_to_byte_offset(audio_end_ms).min(buffer.len());
            let start = format.ms_to_byte_offset(speech.audio_start_ms).min(end);
            speech.audio = Some(buffer[start..end].to_vec());
        }
    }

    fn response_done(&mut self, response: &ResponseResource) -> Result<()> {
        let record = self.response_lookup.get_mut(&response.id).ok_or_else(|| {
            RealtimeError::NotFound(format!("response.done: Response \"{}\" not found", response.id))
        })?;
        record.status = response.status;
        if record.output.is_empty() {
            record.output = response.output_ids();
        }
        Ok(())
    }
}
