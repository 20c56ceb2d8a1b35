//! Typed permission updates.
//!
//! The same objects appear in a permission request's `suggestions` and in a
//! decision's `updated_permissions`.

use serde::{Deserialize, Serialize};

use super::callback::PermissionBehavior;

/// One tool rule, optionally narrowed by rule content (e.g. a command prefix).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRule {
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_content: Option<String>,
}

impl PermissionRule {
    /// Rule covering every use of `tool_name`.
    pub fn tool(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            rule_content: None,
        }
    }

    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.rule_content = Some(content.into());
        self
    }
}

/// A change to the permission settings, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PermissionUpdate {
    SetMode {
        mode: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        destination: Option<String>,
    },
    AddRules {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        rules: Vec<PermissionRule>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        behavior: Option<PermissionBehavior>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        destination: Option<String>,
    },
    ReplaceRules {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        rules: Vec<PermissionRule>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        behavior: Option<PermissionBehavior>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        destination: Option<String>,
    },
    RemoveRules {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        rules: Vec<PermissionRule>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        behavior: Option<PermissionBehavior>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        destination: Option<String>,
    },
    AddDirectories {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        directories: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        destination: Option<String>,
    },
    RemoveDirectories {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        directories: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        destination: Option<String>,
    },
}

fn destination(destination: impl Into<String>) -> Option<String> {
    let destination = destination.into();
    (!destination.is_empty()).then_some(destination)
}

impl PermissionUpdate {
    /// Switch the permission mode (e.g. `acceptEdits`).
    pub fn set_mode(mode: impl Into<String>, dest: impl Into<String>) -> Self {
        Self::SetMode {
            mode: mode.into(),
            destination: destination(dest),
        }
    }

    /// Add rules with the given behavior.
    pub fn add_rules(
        behavior: PermissionBehavior,
        dest: impl Into<String>,
        rules: impl IntoIterator<Item = PermissionRule>,
    ) -> Self {
        Self::AddRules {
            rules: rules.into_iter().collect(),
            behavior: Some(behavior),
            destination: destination(dest),
        }
    }

    /// Replace the rules for the given behavior.
    pub fn replace_rules(
        behavior: PermissionBehavior,
        dest: impl Into<String>,
        rules: impl IntoIterator<Item = PermissionRule>,
    ) -> Self {
        Self::ReplaceRules {
            rules: rules.into_iter().collect(),
            behavior: Some(behavior),
            destination: destination(dest),
        }
    }

    /// Remove rules with the given behavior.
    pub fn remove_rules(
        behavior: PermissionBehavior,
        dest: impl Into<String>,
        rules: impl IntoIterator<Item = PermissionRule>,
    ) -> Self {
        Self::RemoveRules {
            rules: rules.into_iter().collect(),
            behavior: Some(behavior),
            destination: destination(dest),
        }
    }

    /// Grant access to extra working directories.
    pub fn add_directories<I, S>(dest: impl Into<String>, directories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AddDirectories {
            directories: directories.into_iter().map(Into::into).collect(),
            destination: destination(dest),
        }
    }

    /// Revoke access to working directories.
    pub fn remove_directories<I, S>(dest: impl Into<String>, directories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::RemoveDirectories {
            directories: directories.into_iter().map(Into::into).collect(),
            destination: destination(dest),
        }
    }
}
