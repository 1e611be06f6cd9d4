//! Call session orchestrator.
//!
//! A [`CallController`] owns everything mutable about one call: the turn-taking
//! flags, the caller's accumulated input audio and the rebuilt conversation.
//! It runs as a single task that selects over the caller's media stream and the
//! realtime events forwarded from the bus, so no state is shared across tasks.
//!
//! Under server-side turn detection the backend commits caller audio by itself.
//! Without it, the caller ends a turn by pressing [`COMMIT_DIGIT`], which
//! commits the buffered audio and asks for a response.

use crate::link::RealtimeLink;
use crate::media_stream::{CallerCommand, CallerEvent};
use crate::turn::{DeltaVerdict, TurnCommand, TurnTaking};
use anyhow::Context;
use futures::{Sink, SinkExt, Stream, StreamExt};
use openai_realtime::types::{AudioFormat, ContentPart, ConversationEvent, ItemRole};
use openai_realtime::{BusEvent, Conversation, RealtimeError, utils};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Backend events logged at `info`.
pub const LOG_EVENT_TYPES: &[&str] = &[
    "response.content.done",
    "rate_limits.updated",
    "response.done",
    "input_audio_buffer.committed",
    "input_audio_buffer.speech_stopped",
    "input_audio_buffer.speech_started",
    "session.created",
];

/// DTMF digit that ends the caller's turn when turn detection is off.
pub const COMMIT_DIGIT: &str = "#";

/// Every backend event the controller wants forwarded from the bus.
pub fn subscribed_events() -> Vec<&'static str> {
    let mut names = ConversationEvent::TYPES.to_vec();
    for name in LOG_EVENT_TYPES
        .iter()
        .chain(["close", "error", "session.updated"].iter())
    {
        if !names.contains(name) {
            names.push(*name);
        }
    }
    names
}

/// What the relay loop should do after one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Relay {
    /// Write these frames to the caller and keep going.
    Forward(Vec<CallerCommand>),
    /// One side is gone; tear the call down.
    Hangup,
}

impl Relay {
    fn nothing() -> Self {
        Relay::Forward(Vec::new())
    }
}

/// Logged when a call ends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallSummary {
    pub stream_sid: Option<String>,
    pub items: usize,
    pub interruptions: u32,
    pub caller_transcript: Option<String>,
    pub assistant_transcript: Option<String>,
}

pub struct CallController<L> {
    link: L,
    turn: TurnTaking,
    conversation: Conversation,
    stream_sid: Option<String>,
    caller_audio: Vec<u8>,
    greeting: Option<String>,
    turn_detection: Option<&'static str>,
}

impl<L: RealtimeLink> CallController<L> {
    /// A controller for a call whose audio is in `format` on both legs.
    pub fn new(link: L, format: AudioFormat) -> Self {
        Self {
            link,
            turn: TurnTaking::new(format),
            conversation: Conversation::new(format),
            stream_sid: None,
            caller_audio: Vec::new(),
            greeting: None,
            turn_detection: Some("server_vad"),
        }
    }

    /// Matches the session's turn detection; `None` means caller audio is
    /// committed explicitly by [`CallController::create_response`].
    pub fn with_turn_detection(mut self, turn_detection: Option<&'static str>) -> Self {
        self.turn_detection = turn_detection;
        self
    }

    /// Has the assistant speak first, prompted by `greeting`.
    pub fn with_greeting(mut self, greeting: Option<String>) -> Self {
        self.greeting = greeting;
        self
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn turn(&self) -> &TurnTaking {
        &self.turn
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid.as_deref()
    }

    pub fn summary(&self) -> CallSummary {
        let items = self.conversation.items();
        let last_transcript = |role: ItemRole| {
            items
                .iter()
                .rev()
                .filter(|item| item.role == Some(role))
                .map(|item| item.formatted.transcript.as_str())
                .find(|transcript| !transcript.is_empty())
                .map(str::to_owned)
        };
        CallSummary {
            stream_sid: self.stream_sid.clone(),
            items: items.len(),
            interruptions: self.turn.interruptions(),
            caller_transcript: last_transcript(ItemRole::User),
            assistant_transcript: last_transcript(ItemRole::Assistant),
        }
    }

    /// Asks the backend to open the conversation, if a greeting is configured.
    pub fn greet(&mut self) -> Result<(), RealtimeError> {
        let Some(text) = self.greeting.take() else {
            return Ok(());
        };
        let item = json!({
            "type": "message",
            "role": "user",
            "content": [ContentPart::input_text(text)],
        });
        self.link
            .send("conversation.item.create", json!({ "item": item }))?;
        self.create_response()?;
        info!("Requested opening greeting");
        Ok(())
    }

    /// Asks the backend for a response.
    ///
    /// Without turn detection, buffered caller audio is committed first and
    /// queued on the conversation for the user item it becomes.
    pub fn create_response(&mut self) -> Result<(), RealtimeError> {
        if self.turn_detection.is_none() && !self.caller_audio.is_empty() {
            self.link.send("input_audio_buffer.commit", Value::Null)?;
            let committed = std::mem::take(&mut self.caller_audio);
            debug!(bytes = committed.len(), "Committed caller audio");
            self.conversation.queue_input_audio(committed);
        }
        self.link.send("response.create", Value::Null)?;
        Ok(())
    }

    /// Cancels the in-flight response.
    ///
    /// With `item_id`, the item must be an assistant message with an audio
    /// part; it is also truncated to `audio_end_ms`. Nothing is sent when that
    /// check fails.
    pub fn cancel_response(&self, item_id: Option<&str>, audio_end_ms: u64) -> Result<(), RealtimeError> {
        let target = item_id
            .map(|id| self.audio_part_of(id).map(|content_index| (id, content_index)))
            .transpose()?;
        self.link.send("response.cancel", Value::Null)?;
        if let Some((item_id, content_index)) = target {
            self.send_truncate(item_id, content_index, audio_end_ms)?;
        }
        Ok(())
    }

    /// Removes an item from the backend's conversation.
    pub fn delete_item(&self, item_id: &str) -> Result<(), RealtimeError> {
        self.link
            .send("conversation.item.delete", json!({ "item_id": item_id }))?;
        Ok(())
    }

    /// Index of the audio part of an assistant message, the only kind of item
    /// that can be truncated.
    fn audio_part_of(&self, item_id: &str) -> Result<usize, RealtimeError> {
        let item = self
            .conversation
            .get_item(item_id)
            .ok_or_else(|| RealtimeError::NotFound(format!("Could not find item \"{}\"", item_id)))?;
        if !item.is_assistant_message() {
            return Err(RealtimeError::Validation(format!(
                "Item \"{}\" is not an assistant message",
                item_id
            )));
        }
        item.audio_content_index().ok_or_else(|| {
            RealtimeError::Validation(format!("Item \"{}\" has no audio to truncate", item_id))
        })
    }

    fn send_truncate(&self, item_id: &str, content_index: usize, audio_end_ms: u64) -> Result<(), RealtimeError> {
        self.link.send(
            "conversation.item.truncate",
            json!({
                "item_id": item_id,
                "content_index": content_index,
                "audio_end_ms": audio_end_ms,
            }),
        )?;
        Ok(())
    }

    /// Handles one text frame from the caller's media stream.
    pub fn handle_caller_text(&mut self, text: &str) -> Result<Relay, RealtimeError> {
        let event = CallerEvent::parse(text)
            .map_err(|e| RealtimeError::Validation(format!("Malformed caller frame: {}", e)))?;
        self.handle_caller_event(event)
    }

    pub fn handle_caller_event(&mut self, event: CallerEvent) -> Result<Relay, RealtimeError> {
        match event {
            CallerEvent::Connected => debug!("Caller media stream connected"),
            CallerEvent::Start { start } => {
                info!(stream_sid = %start.stream_sid, call_sid = ?start.call_sid, "Incoming stream has started");
                if let Some(format) = &start.media_format {
                    debug!(encoding = %format.encoding, sample_rate = format.sample_rate, "Caller media format");
                }
                self.stream_sid = Some(start.stream_sid);
            }
            CallerEvent::Media { media } => return self.relay_caller_audio(media.payload),
            CallerEvent::Stop => {
                info!(stream_sid = ?self.stream_sid, "Caller stream stopped");
                return Ok(Relay::Hangup);
            }
            CallerEvent::Mark { mark } => {
                if let Some(mark) = mark {
                    if !self.turn.on_playback_mark(&mark.name) {
                        trace!(mark = %mark.name, "Ignoring mark of a finished item");
                    }
                }
            }
            CallerEvent::Dtmf { dtmf } => {
                info!(digit = %dtmf.digit, "DTMF received");
                if self.turn_detection.is_none() && dtmf.digit == COMMIT_DIGIT {
                    self.create_response()?;
                }
            }
            CallerEvent::Unknown => debug!("Ignoring unknown caller event"),
        }
        Ok(Relay::nothing())
    }

    fn relay_caller_audio(&mut self, payload: String) -> Result<Relay, RealtimeError> {
        match utils::base64_to_bytes(&payload) {
            Ok(bytes) => self.caller_audio.extend_from_slice(&bytes),
            Err(e) => warn!(error = %e, "Caller audio could not be decoded"),
        }
        if self.link.is_connected() {
            self.link
                .send("input_audio_buffer.append", json!({ "audio": payload }))?;
        } else {
            trace!("Realtime link closed, dropping caller audio");
        }
        let commands = self.turn.on_caller_audio();
        self.execute(commands)
    }

    /// Handles one event forwarded from the realtime bus.
    pub fn handle_ai_event(&mut self, event: &BusEvent) -> Result<Relay, RealtimeError> {
        let name = event.name.as_str();
        let payload = &event.payload;
        if LOG_EVENT_TYPES.contains(&name) {
            info!(event_type = name, %payload, "Received realtime event");
        } else {
            trace!(event_type = name, "Received realtime event");
        }

        let relay = match name {
            "close" => {
                if payload.get("error").and_then(Value::as_bool).unwrap_or(false) {
                    warn!("Realtime session was closed by the backend");
                } else {
                    info!("Realtime session closed");
                }
                return Ok(Relay::Hangup);
            }
            "error" => {
                error!(%payload, "Realtime backend reported an error");
                Relay::nothing()
            }
            "session.updated" => {
                debug!("Session configuration acknowledged");
                Relay::nothing()
            }
            "input_audio_buffer.speech_started" => {
                let commands = self.turn.on_speech_started();
                self.execute(commands)?
            }
            "input_audio_buffer.speech_stopped" => {
                self.turn.on_speech_stopped();
                Relay::nothing()
            }
            "response.audio.delta" => match self.relay_ai_audio(payload) {
                Some(relay) => relay,
                // Dropped audio never reaches the conversation either.
                None => return Ok(Relay::nothing()),
            },
            "response.done" => {
                self.turn.on_response_done();
                Relay::nothing()
            }
            _ => Relay::nothing(),
        };

        self.aggregate(name, payload);
        Ok(relay)
    }

    fn relay_ai_audio(&mut self, payload: &Value) -> Option<Relay> {
        let (Some(item_id), Some(delta)) = (
            payload.get("item_id").and_then(Value::as_str),
            payload.get("delta").and_then(Value::as_str),
        ) else {
            warn!("Audio delta without item_id or delta");
            return None;
        };
        let len = match utils::base64_to_bytes(delta) {
            Ok(bytes) => bytes.len(),
            Err(e) => {
                warn!(item_id, error = %e, "Assistant audio could not be decoded");
                return None;
            }
        };

        if self.turn.on_audio_delta(item_id, len) == DeltaVerdict::Drop {
            trace!(item_id, "Dropping audio of interrupted item");
            return None;
        }
        let Some(stream_sid) = self.stream_sid.as_deref() else {
            warn!(item_id, "Assistant audio arrived before the caller stream started");
            return Some(Relay::nothing());
        };
        let mut frames = vec![CallerCommand::media(stream_sid, delta)];
        if let Some(mark) = self.turn.playback_mark() {
            frames.push(CallerCommand::mark(stream_sid, mark));
        }
        Some(Relay::Forward(frames))
    }

    fn execute(&mut self, commands: Vec<TurnCommand>) -> Result<Relay, RealtimeError> {
        if commands.is_empty() {
            return Ok(Relay::nothing());
        }
        for command in commands {
            match command {
                TurnCommand::CancelResponse => {
                    self.link.send("response.cancel", Value::Null)?;
                }
                TurnCommand::TruncateItem {
                    item_id,
                    audio_end_ms,
                } => match self.audio_part_of(&item_id) {
                    Ok(content_index) => self.send_truncate(&item_id, content_index, audio_end_ms)?,
                    Err(e) => warn!(item_id = %item_id, error = %e, "Interrupted item cannot be truncated"),
                },
            }
        }
        // Flush whatever the provider has buffered for playback.
        let flush = self
            .stream_sid
            .as_deref()
            .map(CallerCommand::clear)
            .into_iter()
            .collect();
        Ok(Relay::Forward(flush))
    }

    fn aggregate(&mut self, name: &str, payload: &Value) {
        if !ConversationEvent::handles(name) {
            return;
        }
        if let Err(e) = self
            .conversation
            .process_event(payload, Some(&self.caller_audio))
        {
            warn!(event_type = name, error = %e, "Conversation could not apply event");
        }
    }

    /// Relays until either side ends, then closes both.
    ///
    /// `caller_in` yields the caller's text frames; `caller_out` receives the
    /// serialized [`CallerCommand`]s.
    pub async fn run<I, O>(
        mut self,
        mut caller_in: I,
        mut caller_out: O,
        mut ai_events: mpsc::UnboundedReceiver<BusEvent>,
    ) -> anyhow::Result<CallSummary>
    where
        I: Stream<Item = String> + Unpin,
        O: Sink<String> + Unpin,
        O::Error: std::error::Error + Send + Sync + 'static,
    {
        let outcome = self
            .relay(&mut caller_in, &mut caller_out, &mut ai_events)
            .await;

        if self.link.disconnect().await {
            debug!("Closed realtime session");
        }
        if let Err(e) = caller_out.close().await {
            debug!(error = %e, "Caller stream was already closed");
        }
        outcome.map(|()| self.summary())
    }

    async fn relay<I, O>(
        &mut self,
        caller_in: &mut I,
        caller_out: &mut O,
        ai_events: &mut mpsc::UnboundedReceiver<BusEvent>,
    ) -> anyhow::Result<()>
    where
        I: Stream<Item = String> + Unpin,
        O: Sink<String> + Unpin,
        O::Error: std::error::Error + Send + Sync + 'static,
    {
        self.greet().context("Failed to request the greeting")?;

        loop {
            let relay = tokio::select! {
                frame = caller_in.next() => match frame {
                    Some(text) => self.handle_caller_text(&text).context("Caller relay failed")?,
                    None => {
                        info!("Caller stream ended");
                        return Ok(());
                    }
                },
                event = ai_events.recv() => match event {
                    Some(event) => self.handle_ai_event(&event).context("Realtime relay failed")?,
                    None => {
                        info!("Realtime event stream ended");
                        return Ok(());
                    }
                },
            };

            match relay {
                Relay::Hangup => return Ok(()),
                Relay::Forward(commands) => {
                    for command in commands {
                        caller_out
                            .send(command.to_text()?)
                            .await
                            .context("Failed to write to the caller stream")?;
                    }
                }
            }
        }
    }
}
