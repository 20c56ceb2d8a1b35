//! Client-side callback requests and their responses.
//!
//! The service asks the client to run a tool, evaluate a hook, or decide a
//! permission. Each request carries an `invocation_id` that the single
//! response must echo back.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::hook_specific::HookSpecific;
use super::message::ContentBlock;
use super::permission_update::PermissionUpdate;

/// Request to execute a client-hosted tool.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub invocation_id: String,
    /// Fully-qualified tool identifier (e.g. `mcp__server__tool`).
    pub tool_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,
    #[serde(default)]
    pub input: Value,
}

/// Request to evaluate a lifecycle hook.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HookInvocation {
    pub invocation_id: String,
    /// Hook event name (`PreToolUse`, `PostToolUse`, `Stop`, ...).
    pub hook_event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matcher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,
    #[serde(default)]
    pub input: Value,
}

/// Request to decide whether a tool may run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PermissionInvocation {
    pub invocation_id: String,
    pub tool_id: String,
    #[serde(default)]
    pub input: Value,
    /// 1 for the first ask; higher after an `ask` decision was returned.
    #[serde(default)]
    pub attempt: u32,
    #[serde(default)]
    pub suggestions: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,
}

impl PermissionInvocation {
    /// Suggestions decoded as typed updates. Entries of an unknown shape
    /// are left out; `suggestions` keeps the raw list.
    pub fn suggested_updates(&self) -> Vec<PermissionUpdate> {
        self.suggestions
            .iter()
            .filter_map(|raw| serde_json::from_value(raw.clone()).ok())
            .collect()
    }
}

/// Kind of callback, used for logging and canonical fallbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvocationKind {
    Tool,
    Hook,
    Permission,
}

impl InvocationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Hook => "hook",
            Self::Permission => "permission",
        }
    }
}

/// Result payload for a tool invocation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolResult {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub is_error: bool,
    /// Extra top-level fields (e.g. `meta`).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ToolResult {
    pub fn blocks(content: Vec<ContentBlock>, is_error: bool) -> Self {
        Self {
            content,
            is_error,
            extra: Map::new(),
        }
    }

    /// Successful plain-text result.
    pub fn text(text: impl Into<String>) -> Self {
        Self::blocks(vec![ContentBlock::text(text)], false)
    }

    /// Error-content result; also the canonical fallback for failed tools.
    pub fn error(text: impl Into<String>) -> Self {
        Self::blocks(vec![ContentBlock::text(text)], true)
    }

    /// Successful JSON result.
    pub fn json(value: Value) -> Self {
        Self::blocks(vec![ContentBlock::json(value)], false)
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.extra.insert("meta".to_string(), metadata);
        self
    }
}

/// Output of a hook evaluation.
///
/// `continue` is optional on the wire: omitted means "continue".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HookOutput {
    #[serde(rename = "continue", default, skip_serializing_if = "Option::is_none")]
    pub continue_: Option<bool>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub suppress_output: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
    #[serde(rename = "async", default, skip_serializing_if = "std::ops::Not::not")]
    pub run_async: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub async_timeout_ms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook_specific_output: Option<Value>,
}

impl HookOutput {
    /// All fields unset; the service applies its own defaults.
    pub fn default_output() -> Self {
        Self::default()
    }

    /// `continue=true`.
    pub fn proceed() -> Self {
        Self {
            continue_: Some(true),
            ..Self::default()
        }
    }

    /// `continue=false`; also the canonical fallback for failed hooks.
    pub fn stop(reason: impl Into<String>) -> Self {
        Self {
            continue_: Some(false),
            stop_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn block(reason: impl Into<String>, system_message: impl Into<String>) -> Self {
        Self {
            continue_: Some(false),
            decision: Some("block".to_string()),
            reason: Some(reason.into()),
            system_message: Some(system_message.into()),
            ..Self::default()
        }
    }

    pub fn suppress_output(system_message: impl Into<String>) -> Self {
        Self {
            continue_: Some(true),
            suppress_output: true,
            system_message: Some(system_message.into()),
            ..Self::default()
        }
    }

    pub fn run_async(timeout_ms: u32) -> Self {
        Self {
            continue_: Some(true),
            run_async: true,
            async_timeout_ms: Some(timeout_ms),
            ..Self::default()
        }
    }

    /// Attach a typed `hookSpecificOutput`.
    pub fn with_specific(self, specific: &HookSpecific) -> serde_json::Result<Self> {
        Ok(self.with_specific_value(specific.to_value()?))
    }

    /// Attach a raw `hookSpecificOutput` object.
    #[must_use]
    pub fn with_specific_value(mut self, specific: Value) -> Self {
        self.hook_specific_output = Some(specific);
        self
    }

    /// The attached `hookSpecificOutput`, if it is one of the typed shapes.
    pub fn specific(&self) -> Option<HookSpecific> {
        serde_json::from_value(self.hook_specific_output.clone()?).ok()
    }

    /// Whether the service will continue after this output.
    ///
    /// `decision == "block"` stops even when `continue` is omitted.
    pub fn should_continue(&self) -> bool {
        if self.decision.as_deref() == Some("block") {
            return false;
        }
        self.continue_.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionBehavior {
    Allow,
    #[default]
    Deny,
    Ask,
}

/// Decision for a permission invocation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PermissionDecision {
    pub behavior: PermissionBehavior,
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_input: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updated_permissions: Vec<PermissionUpdate>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub interrupt: bool,
}

impl PermissionDecision {
    fn with_behavior(behavior: PermissionBehavior, reason: impl Into<String>) -> Self {
        Self {
            behavior,
            reason: reason.into(),
            ..Self::default()
        }
    }

    /// Allow the tool to run.
    pub fn allow(reason: impl Into<String>) -> Self {
        Self::with_behavior(PermissionBehavior::Allow, reason)
    }

    /// Deny; also the canonical fallback for failed permission handlers.
    pub fn deny(reason: impl Into<String>) -> Self {
        Self::with_behavior(PermissionBehavior::Deny, reason)
    }

    /// Ask again; the next attempt carries a higher `attempt`.
    pub fn ask(reason: impl Into<String>) -> Self {
        Self::with_behavior(PermissionBehavior::Ask, reason)
    }

    #[must_use]
    pub fn with_updated_input(mut self, input: Value) -> Self {
        self.updated_input = Some(input);
        self
    }

    /// Permission setting changes to apply along with this decision.
    #[must_use]
    pub fn with_updated_permissions(
        mut self,
        updates: impl IntoIterator<Item = PermissionUpdate>,
    ) -> Self {
        self.updated_permissions = updates.into_iter().collect();
        self
    }

    /// Ask the service to interrupt the turn after this decision.
    #[must_use]
    pub const fn with_interrupt(mut self, interrupt: bool) -> Self {
        self.interrupt = interrupt;
        self
    }
}
