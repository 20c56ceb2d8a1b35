//! Session-init details and service capabilities.

use serde_json::{Map, Value};

use sidecar_proto::SessionInit;

/// Typed view over the raw session-init object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionInitInfo {
    pub claude_session_id: String,
    pub tools: Vec<String>,
    pub raw: Map<String, Value>,
}

impl SessionInitInfo {
    /// Read the well-known fields and keep the raw object.
    pub fn parse(init: &SessionInit) -> Self {
        let raw = match &init.raw_init {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        Self {
            claude_session_id: init.claude_session_id.clone(),
            tools: init.tools.clone(),
            raw,
        }
    }

    /// String value of `key`; non-string values are rendered as JSON.
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.raw.get(key)? {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// String items of the list at `key`; other items are skipped.
    pub fn get_string_list(&self, key: &str) -> Vec<String> {
        self.raw
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Nested object under `key`.
    pub fn get_map(&self, key: &str) -> Option<&Map<String, Value>> {
        self.raw.get(key).and_then(Value::as_object)
    }

    /// Slash commands the service advertised.
    pub fn commands(&self) -> Vec<String> {
        self.get_string_list("commands")
    }

    /// Active output style, if reported.
    pub fn output_style(&self) -> Option<String> {
        self.get_string("output_style")
    }
}

/// Capability names advertised by the service.
pub mod capabilities {
    pub const HOOKS: &str = "hooks";
    pub const PERMISSIONS: &str = "permissions";
    pub const PERMISSION_SUGGESTIONS: &str = "permission_suggestions";
    pub const PERMISSION_UPDATES: &str = "permission_updates";
    pub const PERMISSION_INTERRUPT: &str = "permission_interrupt";
    pub const SDK_MCP: &str = "sdk_mcp";
    pub const MCP_EXTERNAL: &str = "mcp_external";
    pub const CLIENT_TOOLS: &str = "client_tools";
    pub const CHECKPOINTING: &str = "checkpointing";
    pub const REWIND_FILES: &str = "rewind_files";
    pub const STRUCTURED_OUTPUTS: &str = "structured_outputs";
    pub const SANDBOX: &str = "sandbox";
    pub const AGENTS: &str = "agents";
    pub const PLUGINS: &str = "plugins";
    pub const SESSIONS: &str = "sessions";
    pub const RESUME: &str = "resume";
    pub const FORK: &str = "fork";
    pub const INPUT_STREAM: &str = "input_stream";
    pub const STDERR: &str = "stderr";
    pub const PARTIAL_MESSAGES: &str = "partial_messages";
    pub const DYNAMIC_CONTROL: &str = "dynamic_control";
}

/// Whether `capability` is in `advertised`. An empty name never matches.
pub fn has_capability<S: AsRef<str>>(advertised: &[S], capability: &str) -> bool {
    !capability.is_empty() && advertised.iter().any(|c| c.as_ref() == capability)
}
