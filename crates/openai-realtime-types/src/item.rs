//! Conversation items as they travel on the wire, and the aggregated form
//! the conversation keeps for each of them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Message,
    FunctionCall,
    FunctionCallOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    InProgress,
    Completed,
    Incomplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    InputText,
    Audio,
    InputAudio,
}

/// One typed block of an item's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: ContentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Base64 audio, only present on parts we create ourselves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

impl ContentPart {
    pub fn input_text(text: impl Into<String>) -> Self {
        Self {
            kind: ContentType::InputText,
            text: Some(text.into()),
            audio: None,
            transcript: None,
        }
    }

    /// Whether the part carries text (as opposed to audio).
    pub fn is_text(&self) -> bool {
        matches!(self.kind, ContentType::Text | ContentType::InputText)
    }
}

/// An item as carried by `conversation.item.*` and `response.output_item.*`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ItemRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ItemStatus>,
    #[serde(default)]
    pub content: Vec<ContentPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Tool call descriptor accumulated for `function_call` items.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormattedTool {
    pub name: String,
    pub call_id: String,
    pub arguments: String,
}

/// The renderable view of an item, rebuilt by replaying its deltas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormattedItem {
    /// Raw audio bytes in the session's audio format.
    pub audio: Vec<u8>,
    pub text: String,
    pub transcript: String,
    pub tool: Option<FormattedTool>,
    pub output: Option<String>,
}

/// An item held by the conversation aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationItem {
    pub id: String,
    pub kind: ItemKind,
    pub role: Option<ItemRole>,
    pub status: ItemStatus,
    pub content: Vec<ContentPart>,
    pub call_id: Option<String>,
    pub name: Option<String>,
    pub arguments: String,
    pub output: Option<String>,
    pub formatted: FormattedItem,
}

impl ConversationItem {
    /// Wraps a wire item with an empty formatted view.
    ///
    /// Status defaults to `in_progress` until the aggregator decides otherwise.
    pub fn from_item(item: Item) -> Self {
        Self {
            id: item.id,
            kind: item.kind,
            role: item.role,
            status: item.status.unwrap_or(ItemStatus::InProgress),
            content: item.content,
            call_id: item.call_id,
            name: item.name,
            arguments: item.arguments.unwrap_or_default(),
            output: item.output,
            formatted: FormattedItem::default(),
        }
    }

    pub fn is_assistant_message(&self) -> bool {
        self.kind == ItemKind::Message && self.role == Some(ItemRole::Assistant)
    }

    /// Index of the first audio content part, if any.
    pub fn audio_content_index(&self) -> Option<usize> {
        self.content
            .iter()
            .position(|c| c.kind == ContentType::Audio)
    }
}
