//! Message events and content blocks.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of a message observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    User,
    Assistant,
    System,
    Result,
    StreamEvent,
}

impl MessageKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Result => "result",
            Self::StreamEvent => "stream_event",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed message, either final or partial (still streaming).
///
/// Partial and final observations of the same kind are distinct events; a
/// final message never mutates an earlier partial one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    #[serde(default)]
    pub is_partial: bool,
    pub message: Message,
}

impl MessageEvent {
    /// Final (non-partial) observation.
    pub const fn complete(message: Message) -> Self {
        Self {
            is_partial: false,
            message,
        }
    }

    /// Partial observation.
    pub const fn partial(message: Message) -> Self {
        Self {
            is_partial: true,
            message,
        }
    }

    pub const fn kind(&self) -> MessageKind {
        self.message.kind()
    }
}

/// Message payload, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    User(UserMessage),
    Assistant(AssistantMessage),
    System(SystemMessage),
    Result(ResultMessage),
    StreamEvent(StreamEventMessage),
}

impl Message {
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::User(_) => MessageKind::User,
            Self::Assistant(_) => MessageKind::Assistant,
            Self::System(_) => MessageKind::System,
            Self::Result(_) => MessageKind::Result,
            Self::StreamEvent(_) => MessageKind::StreamEvent,
        }
    }

    pub const fn as_user(&self) -> Option<&UserMessage> {
        match self {
            Self::User(m) => Some(m),
            _ => None,
        }
    }

    pub const fn as_assistant(&self) -> Option<&AssistantMessage> {
        match self {
            Self::Assistant(m) => Some(m),
            _ => None,
        }
    }

    pub const fn as_system(&self) -> Option<&SystemMessage> {
        match self {
            Self::System(m) => Some(m),
            _ => None,
        }
    }

    pub const fn as_result(&self) -> Option<&ResultMessage> {
        match self {
            Self::Result(m) => Some(m),
            _ => None,
        }
    }

    pub const fn as_stream_event(&self) -> Option<&StreamEventMessage> {
        match self {
            Self::StreamEvent(m) => Some(m),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AssistantMessage {
    /// Assistant message holding a single text block.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            ..Self::default()
        }
    }

    /// Concatenated text of all text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SystemMessage {
    #[serde(default)]
    pub subtype: String,
    #[serde(default)]
    pub data: Value,
}

/// Final accounting message for a request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultMessage {
    #[serde(default)]
    pub subtype: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub duration_api_ms: u64,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub num_turns: u32,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub total_cost_usd: f64,
    #[serde(default)]
    pub usage: Value,
    #[serde(default)]
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_output: Option<Value>,
}

impl ResultMessage {
    pub fn success(result: impl Into<String>) -> Self {
        Self {
            subtype: "success".to_string(),
            result: result.into(),
            ..Self::default()
        }
    }
}

/// Raw streaming event forwarded from the model API.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StreamEventMessage {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub event: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,
}

/// Content block inside user/assistant messages and tool results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
        #[serde(default)]
        signature: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: bool,
    },
    Json {
        json: Value,
    },
    Image {
        data: String,
        mime_type: String,
    },
    /// Block type not known to this client version.
    #[serde(other)]
    Unknown,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub const fn json(json: Value) -> Self {
        Self::Json { json }
    }

    pub fn image(base64_data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::Image {
            data: base64_data.into(),
            mime_type: mime_type.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn assistant_text_joins_text_blocks_only() {
        let msg = AssistantMessage {
            content: vec![
                ContentBlock::text("hello "),
                ContentBlock::ToolUse {
                    id: "t1".into(),
                    name: "Bash".into(),
                    input: json!({"command": "ls"}),
                },
                ContentBlock::text("world"),
            ],
            ..AssistantMessage::default()
        };
        assert_eq!(msg.text(), "hello world");
    }

    #[test]
    fn unknown_content_block_is_tolerated() {
        let block: ContentBlock =
            serde_json::from_value(json!({"type": "redacted_thinking", "data": "x"})).unwrap();
        assert_eq!(block, ContentBlock::Unknown);
    }

    #[test]
    fn message_event_wire_shape() {
        let event = MessageEvent::partial(Message::Assistant(AssistantMessage::from_text("p")));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["is_partial"], true);
        assert_eq!(value["message"]["kind"], "assistant");
        assert_eq!(value["message"]["content"][0]["text"], "p");
        assert_eq!(event.kind(), MessageKind::Assistant);
    }
}
