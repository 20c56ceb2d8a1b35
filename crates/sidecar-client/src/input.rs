//! Events fed into a query's input stream.

use serde_json::{Map, Value, json};

use sidecar_proto::ContentBlock;

/// A user turn written into an input stream.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserInput {
    /// Defaults to `user` when empty.
    pub role: String,
    pub content: Value,
    pub parent_tool_use_id: Option<String>,
    pub session_id: Option<String>,
    /// Extra top-level fields, written last.
    pub additional: Map<String, Value>,
}

/// Reply to a control request received on the output side.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlResponse {
    Success { request_id: String, response: Value },
    Error { request_id: String, error: String },
}

/// One event of an input stream.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    User(UserInput),
    ControlResponse(ControlResponse),
    /// Passed through as-is.
    Raw(Map<String, Value>),
}

impl InputEvent {
    /// User turn with plain text content.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::User(UserInput {
            content: Value::String(text.into()),
            ..UserInput::default()
        })
    }

    /// User turn with content blocks.
    pub fn user_blocks(blocks: &[ContentBlock]) -> serde_json::Result<Self> {
        Ok(Self::User(UserInput {
            content: serde_json::to_value(blocks)?,
            ..UserInput::default()
        }))
    }

    /// Successful answer to a control request.
    pub fn control_success(request_id: impl Into<String>, response: Value) -> Self {
        Self::ControlResponse(ControlResponse::Success {
            request_id: request_id.into(),
            response,
        })
    }

    /// Failed answer to a control request.
    pub fn control_error(request_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::ControlResponse(ControlResponse::Error {
            request_id: request_id.into(),
            error: error.into(),
        })
    }

    /// JSON object carried by an input chunk.
    pub fn to_value(&self) -> Value {
        match self {
            Self::User(user) => {
                let role = if user.role.is_empty() {
                    "user"
                } else {
                    user.role.as_str()
                };
                let mut payload = Map::new();
                payload.insert("type".into(), json!("user"));
                payload.insert(
                    "message".into(),
                    json!({"role": role, "content": user.content}),
                );
                if let Some(id) = user.parent_tool_use_id.as_deref().filter(|s| !s.is_empty()) {
                    payload.insert("parent_tool_use_id".into(), json!(id));
                }
                if let Some(id) = user.session_id.as_deref().filter(|s| !s.is_empty()) {
                    payload.insert("session_id".into(), json!(id));
                }
                for (key, value) in &user.additional {
                    payload.insert(key.clone(), value.clone());
                }
                Value::Object(payload)
            }
            Self::ControlResponse(ControlResponse::Success {
                request_id,
                response,
            }) => json!({
                "type": "control_response",
                "response": {"subtype": "success", "request_id": request_id, "response": response},
            }),
            Self::ControlResponse(ControlResponse::Error { request_id, error }) => json!({
                "type": "control_response",
                "response": {"subtype": "error", "request_id": request_id, "error": error},
            }),
            Self::Raw(map) => Value::Object(map.clone()),
        }
    }
}
