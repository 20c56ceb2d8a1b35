//! Session configuration.

use sidecar_core::Config;
use sidecar_core::config::{BufferConfig, DEFAULT_PROTOCOL};

/// Settings a session needs at attach time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub client_name: String,
    pub client_version: String,
    /// Protocol version announced in the hello envelope.
    pub protocol: String,
    pub buffers: BufferConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        let protocol = if config.client.protocol.is_empty() {
            DEFAULT_PROTOCOL.to_string()
        } else {
            config.client.protocol.clone()
        };
        Self {
            client_name: config.client.name.clone(),
            client_version: config.client.version.clone(),
            protocol,
            buffers: config.buffers,
        }
    }
}
