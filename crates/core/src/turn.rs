//! Barge-in state machine for one call.
//!
//! Two flags decide who holds the floor: the caller (reported by the backend's
//! voice activity detection) and the assistant (set by the first audio delta of
//! a response). When both are raised the assistant is interrupted: its response
//! is cancelled and the item it was speaking is truncated to what the caller
//! has actually heard.
//!
//! Audio reaches the caller much faster than it plays, so forwarded bytes are
//! not a measure of what was heard. Every forwarded chunk is followed by a
//! playback mark, and only marks echoed back by the provider advance the
//! played position.
//!
//! This type performs no I/O. It returns [`TurnCommand`]s for the controller to
//! execute.

use openai_realtime::types::AudioFormat;
use std::collections::VecDeque;
use tracing::{debug, info, trace};

/// Who currently holds the floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    CallerSpeaking,
    AiGenerating,
    /// Caller speaking while the assistant is still generating.
    BothActive,
}

/// Side effects requested from the realtime backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnCommand {
    /// Send `response.cancel`.
    CancelResponse,
    /// Send `conversation.item.truncate` for the item's audio part.
    TruncateItem { item_id: String, audio_end_ms: u64 },
}

/// What to do with an assistant audio delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaVerdict {
    Forward,
    /// The delta belongs to a response the caller already talked over.
    Drop,
}

#[derive(Debug, Clone)]
struct PlayingItem {
    item_id: String,
    bytes_sent: usize,
    bytes_played: usize,
    /// Marks awaiting their echo, oldest first, with the byte count each covers.
    pending_marks: VecDeque<(String, usize)>,
}

impl PlayingItem {
    fn new(item_id: &str) -> Self {
        Self {
            item_id: item_id.to_owned(),
            bytes_sent: 0,
            bytes_played: 0,
            pending_marks: VecDeque::new(),
        }
    }
}

#[derive(Debug)]
pub struct TurnTaking {
    format: AudioFormat,
    caller_speaking: bool,
    ai_generating: bool,
    playing: Option<PlayingItem>,
    interrupted_item: Option<String>,
    interruptions: u32,
    marks_issued: u64,
}

impl TurnTaking {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            caller_speaking: false,
            ai_generating: false,
            playing: None,
            interrupted_item: None,
            interruptions: 0,
            marks_issued: 0,
        }
    }

    pub fn state(&self) -> TurnState {
        match (self.caller_speaking, self.ai_generating) {
            (false, false) => TurnState::Idle,
            (true, false) => TurnState::CallerSpeaking,
            (false, true) => TurnState::AiGenerating,
            (true, true) => TurnState::BothActive,
        }
    }

    pub fn interruptions(&self) -> u32 {
        self.interruptions
    }

    /// Milliseconds of the current assistant item the caller has heard.
    pub fn played_ms(&self) -> u64 {
        self.playing
            .as_ref()
            .map_or(0, |p| self.format.bytes_to_ms(p.bytes_played))
    }

    /// Milliseconds of the current assistant item handed to the caller's provider.
    pub fn sent_ms(&self) -> u64 {
        self.playing
            .as_ref()
            .map_or(0, |p| self.format.bytes_to_ms(p.bytes_sent))
    }

    /// A caller audio frame was relayed to the backend.
    pub fn on_caller_audio(&mut self) -> Vec<TurnCommand> {
        if self.state() == TurnState::BothActive {
            return self.interrupt();
        }
        Vec::new()
    }

    /// The backend detected the caller starting to talk.
    pub fn on_speech_started(&mut self) -> Vec<TurnCommand> {
        self.caller_speaking = true;
        if self.ai_generating {
            return self.interrupt();
        }
        Vec::new()
    }

    pub fn on_speech_stopped(&mut self) {
        self.caller_speaking = false;
    }

    /// Accounts for `len` decoded bytes of assistant audio for `item_id`.
    pub fn on_audio_delta(&mut self, item_id: &str, len: usize) -> DeltaVerdict {
        if self.interrupted_item.as_deref() == Some(item_id) {
            return DeltaVerdict::Drop;
        }
        if !self.ai_generating {
            debug!(item_id, "assistant started speaking");
            self.ai_generating = true;
        }
        if self.playing.as_ref().is_none_or(|p| p.item_id != item_id) {
            self.playing = Some(PlayingItem::new(item_id));
        }
        if let Some(playing) = self.playing.as_mut() {
            playing.bytes_sent += len;
        }
        DeltaVerdict::Forward
    }

    /// Names a mark covering everything forwarded so far for the current item.
    ///
    /// The controller sends it to the caller right after the audio; when the
    /// provider echoes it back, [`TurnTaking::on_playback_mark`] moves the
    /// played position up to it.
    pub fn playback_mark(&mut self) -> Option<String> {
        let playing = self.playing.as_mut()?;
        self.marks_issued += 1;
        let name = format!("{}:{}", playing.item_id, self.marks_issued);
        playing
            .pending_marks
            .push_back((name.clone(), playing.bytes_sent));
        Some(name)
    }

    /// The provider finished playing up to the mark `name`.
    ///
    /// Returns `false` for marks that belong to no item still playing, such as
    /// the ones flushed after an interruption.
    pub fn on_playback_mark(&mut self, name: &str) -> bool {
        let Some(playing) = self.playing.as_mut() else {
            return false;
        };
        let Some(position) = playing.pending_marks.iter().position(|(n, _)| n == name) else {
            return false;
        };
        // Marks play back in order, so every earlier one is implied.
        let acknowledged = playing.pending_marks.drain(..=position).last();
        if let Some((_, bytes)) = acknowledged {
            playing.bytes_played = bytes;
        }
        trace!(mark = name, bytes_played = playing.bytes_played, "playback acknowledged");
        true
    }

    pub fn on_response_done(&mut self) {
        self.ai_generating = false;
        self.playing = None;
    }

    fn interrupt(&mut self) -> Vec<TurnCommand> {
        self.ai_generating = false;
        self.interruptions += 1;

        let mut commands = vec![TurnCommand::CancelResponse];
        if let Some(playing) = self.playing.take() {
            let audio_end_ms = self.format.bytes_to_ms(playing.bytes_played);
            info!(
                item_id = %playing.item_id,
                audio_end_ms,
                sent_ms = self.format.bytes_to_ms(playing.bytes_sent),
                "caller interrupted the assistant"
            );
            if playing.bytes_sent > 0 {
                commands.push(TurnCommand::TruncateItem {
                    item_id: playing.item_id.clone(),
                    audio_end_ms,
                });
            }
            self.interrupted_item = Some(playing.item_id);
        } else {
            info!("caller interrupted the assistant before any audio was sent");
        }
        commands
    }
}
