//! Typed `hookSpecificOutput` payloads.
//!
//! Each variant serializes to the object the service expects for its hook
//! event, tagged by `hookEventName`. Unset fields are omitted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::callback::PermissionBehavior;

/// Event-specific part of a hook output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "hookEventName")]
pub enum HookSpecific {
    PreToolUse(PreToolUseSpecific),
    PostToolUse(AdditionalContext),
    UserPromptSubmit(AdditionalContext),
    SessionStart(AdditionalContext),
}

/// `PreToolUse` output: a permission verdict and/or rewritten tool input.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreToolUseSpecific {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_decision: Option<PermissionBehavior>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_decision_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_input: Option<Value>,
}

/// Extra context appended to the conversation by a hook.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<String>,
}

impl AdditionalContext {
    fn new(context: impl Into<String>) -> Self {
        Self {
            additional_context: Some(context.into()),
        }
    }
}

impl HookSpecific {
    /// `PreToolUse` permission verdict with its reason.
    pub fn pre_tool_use_decision(decision: PermissionBehavior, reason: impl Into<String>) -> Self {
        let reason: String = reason.into();
        Self::PreToolUse(PreToolUseSpecific {
            permission_decision: Some(decision),
            permission_decision_reason: (!reason.is_empty()).then_some(reason),
            updated_input: None,
        })
    }

    /// `PreToolUse` rewrite of the tool's input.
    pub fn pre_tool_use_updated_input(input: Value) -> Self {
        Self::PreToolUse(PreToolUseSpecific {
            updated_input: Some(input),
            ..PreToolUseSpecific::default()
        })
    }

    pub fn post_tool_use_context(context: impl Into<String>) -> Self {
        Self::PostToolUse(AdditionalContext::new(context))
    }

    pub fn user_prompt_submit_context(context: impl Into<String>) -> Self {
        Self::UserPromptSubmit(AdditionalContext::new(context))
    }

    pub fn session_start_context(context: impl Into<String>) -> Self {
        Self::SessionStart(AdditionalContext::new(context))
    }

    /// Hook event this output answers.
    pub const fn hook_event_name(&self) -> &'static str {
        match self {
            Self::PreToolUse(_) => "PreToolUse",
            Self::PostToolUse(_) => "PostToolUse",
            Self::UserPromptSubmit(_) => "UserPromptSubmit",
            Self::SessionStart(_) => "SessionStart",
        }
    }

    /// JSON object as sent on the wire.
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}
