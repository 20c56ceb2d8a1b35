//! Inbound and outbound envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::callback::{
    HookInvocation, HookOutput, InvocationKind, PermissionDecision, PermissionInvocation,
    ToolInvocation, ToolResult,
};
use super::message::MessageEvent;

// ---------------------------------------------------------------------------
// Inbound (service -> client)
// ---------------------------------------------------------------------------

/// Event received from the service, with its correlation keys.
///
/// Session-level events (`session_init`, `session_closed`) carry neither a
/// `request_id` nor a `turn_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub event: ServerEvent,
}

impl ServerEnvelope {
    /// Envelope with no correlation keys.
    pub const fn new(event: ServerEvent) -> Self {
        Self {
            request_id: None,
            turn_id: None,
            session_id: None,
            event,
        }
    }

    #[must_use]
    pub fn with_request(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    #[must_use]
    pub fn with_turn(mut self, turn_id: impl Into<String>) -> Self {
        self.turn_id = Some(turn_id.into());
        self
    }

    /// Request id, treating an empty string as absent.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Turn id, treating an empty string as absent.
    pub fn turn_id(&self) -> Option<&str> {
        self.turn_id.as_deref().filter(|id| !id.is_empty())
    }

    /// The boundary carried by this envelope, if any.
    pub const fn turn_boundary(&self) -> Option<&TurnBoundary> {
        match &self.event {
            ServerEvent::Turn(boundary) => Some(boundary),
            _ => None,
        }
    }

    /// Whether this is a turn-end boundary.
    pub fn is_turn_end(&self) -> bool {
        self.turn_boundary()
            .is_some_and(|b| b.kind == TurnBoundaryKind::TurnEnd)
    }
}

/// Inbound event payload, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    SessionInit(SessionInit),
    Message(MessageEvent),
    Turn(TurnBoundary),
    StderrLine(StderrLine),
    Error(SidecarError),
    SessionClosed(SessionClosed),
    ToolInvocation(ToolInvocation),
    HookInvocation(HookInvocation),
    PermissionInvocation(PermissionInvocation),
}

impl ServerEvent {
    /// Callback kind when this event asks the client for a response.
    pub const fn invocation_kind(&self) -> Option<InvocationKind> {
        match self {
            Self::ToolInvocation(_) => Some(InvocationKind::Tool),
            Self::HookInvocation(_) => Some(InvocationKind::Hook),
            Self::PermissionInvocation(_) => Some(InvocationKind::Permission),
            _ => None,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::SessionInit(_) => "session_init",
            Self::Message(_) => "message",
            Self::Turn(_) => "turn",
            Self::StderrLine(_) => "stderr_line",
            Self::Error(_) => "error",
            Self::SessionClosed(_) => "session_closed",
            Self::ToolInvocation(_) => "tool_invocation",
            Self::HookInvocation(_) => "hook_invocation",
            Self::PermissionInvocation(_) => "permission_invocation",
        }
    }
}

/// First event of an attached session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionInit {
    #[serde(default)]
    pub claude_session_id: String,
    #[serde(default)]
    pub tools: Vec<String>,
    /// Raw init object as emitted by the agent runtime.
    #[serde(default)]
    pub raw_init: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnBoundaryKind {
    TurnBegin,
    TurnEnd,
}

/// Marker delimiting a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnBoundary {
    pub kind: TurnBoundaryKind,
    #[serde(default)]
    pub turn_index: u32,
}

impl TurnBoundary {
    pub const fn begin(turn_index: u32) -> Self {
        Self {
            kind: TurnBoundaryKind::TurnBegin,
            turn_index,
        }
    }

    pub const fn end(turn_index: u32) -> Self {
        Self {
            kind: TurnBoundaryKind::TurnEnd,
            turn_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StderrLine {
    pub line: String,
}

/// Protocol-level error reported by the service.
///
/// `fatal` is informational; it closes nothing on the client side.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SidecarError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub fatal: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionClosed {
    #[serde(default)]
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Outbound (client -> service)
// ---------------------------------------------------------------------------

/// Event sent to the service.
///
/// `session_id` is filled in by the session when left empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub event: ClientEvent,
}

impl ClientEnvelope {
    /// Envelope with no request or session id.
    pub const fn new(event: ClientEvent) -> Self {
        Self {
            request_id: None,
            session_id: None,
            event,
        }
    }

    #[must_use]
    pub fn with_request(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Outbound event payload, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Hello(ClientHello),
    Query(QueryRequest),
    InputChunk(StreamInputChunk),
    EndInput(EndInputStream),
    Interrupt(InterruptRequest),
    Cancel(CancelRequest),
    SetPermissionMode(SetPermissionModeRequest),
    SetModel(SetModelRequest),
    ToolResponse(ToolInvocationResponse),
    HookResponse(HookInvocationResponse),
    PermissionResponse(PermissionDecisionResponse),
}

impl ClientEvent {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Hello(_) => "hello",
            Self::Query(_) => "query",
            Self::InputChunk(_) => "input_chunk",
            Self::EndInput(_) => "end_input",
            Self::Interrupt(_) => "interrupt",
            Self::Cancel(_) => "cancel",
            Self::SetPermissionMode(_) => "set_permission_mode",
            Self::SetModel(_) => "set_model",
            Self::ToolResponse(_) => "tool_response",
            Self::HookResponse(_) => "hook_response",
            Self::PermissionResponse(_) => "permission_response",
        }
    }

    /// Invocation id echoed by callback responses.
    pub fn invocation_id(&self) -> Option<&str> {
        match self {
            Self::ToolResponse(r) => Some(&r.invocation_id),
            Self::HookResponse(r) => Some(&r.invocation_id),
            Self::PermissionResponse(r) => Some(&r.invocation_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClientHello {
    pub protocol_version: String,
    #[serde(default)]
    pub client_name: String,
    #[serde(default)]
    pub client_version: String,
}

/// Prompt source for a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryPrompt {
    /// Single prompt string.
    Text(String),
    /// Reference to an input stream fed with `input_chunk` events.
    InputStream(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub prompt: QueryPrompt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInputChunk {
    pub input_stream_id: String,
    pub event: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndInputStream {
    pub input_stream_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InterruptRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPermissionModeRequest {
    pub mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetModelRequest {
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationResponse {
    pub invocation_id: String,
    pub tool_result: ToolResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookInvocationResponse {
    pub invocation_id: String,
    pub output: HookOutput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionDecisionResponse {
    pub invocation_id: String,
    pub decision: PermissionDecision,
}
