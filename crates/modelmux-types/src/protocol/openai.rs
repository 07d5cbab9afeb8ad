//! OpenAI ChatCompletions API types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One chat message. Unknown fields are ignored; the raw body is what gets forwarded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
}

/// Message content: a plain string or a list of typed parts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        #[serde(default)]
        text: String,
    },
    #[serde(alias = "image")]
    ImageUrl {
        #[serde(default)]
        image_url: Value,
    },
    #[serde(alias = "audio", alias = "audio_url")]
    InputAudio {
        #[serde(default)]
        input_audio: Value,
    },
    #[serde(other)]
    Other,
}

impl MessageContent {
    /// Concatenated text of this content (parts joined by newline).
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    fn has_part(&self, pred: impl Fn(&ContentPart) -> bool) -> bool {
        match self {
            MessageContent::Text(_) => false,
            MessageContent::Parts(parts) => parts.iter().any(pred),
        }
    }
}

impl ChatMessage {
    pub fn is_user(&self) -> bool {
        self.role.eq_ignore_ascii_case("user")
    }

    pub fn text(&self) -> String {
        self.content.as_ref().map(MessageContent::text).unwrap_or_default()
    }

    pub fn has_image(&self) -> bool {
        self.content
            .as_ref()
            .is_some_and(|c| c.has_part(|p| matches!(p, ContentPart::ImageUrl { .. })))
    }

    pub fn has_audio(&self) -> bool {
        self.content
            .as_ref()
            .is_some_and(|c| c.has_part(|p| matches!(p, ContentPart::InputAudio { .. })))
    }

    /// Parse `body.messages`, skipping entries that do not look like messages.
    pub fn parse_list(body: &Value) -> Vec<ChatMessage> {
        body.get("messages")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|m| serde_json::from_value::<ChatMessage>(m.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Concatenated user-role text, newline separated.
pub fn user_text(messages: &[ChatMessage]) -> String {
    messages.iter().filter(|m| m.is_user()).map(ChatMessage::text).collect::<Vec<_>>().join("\n")
}

/// Token usage as reported by the upstream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ChatUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

impl ChatUsage {
    /// Extract `usage` from a completion body or stream chunk.
    pub fn from_body(body: &Value) -> Option<Self> {
        body.get("usage")
            .filter(|u| u.is_object())
            .and_then(|u| serde_json::from_value(u.clone()).ok())
    }
}

/// `GET /v1/models` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelEntry {
    pub id: String,
    pub object: String,
    pub owned_by: String,
}

impl ModelList {
    pub fn new(data: Vec<ModelEntry>) -> Self {
        Self { object: "list".to_string(), data }
    }
}

impl ModelEntry {
    pub fn new(id: impl Into<String>, owned_by: impl Into<String>) -> Self {
        Self { id: id.into(), object: "model".to_string(), owned_by: owned_by.into() }
    }
}
