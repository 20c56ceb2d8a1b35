//! Configuration resolution for sidecar clients.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/sidecar/settings.json)
//! 3. Project config (.sidecar/settings.json)
//! 4. Environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Protocol version sent in the hello envelope when none is configured.
pub const DEFAULT_PROTOCOL: &str = "v1";

/// Complete client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub buffers: BufferConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Identity announced to the service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    pub name: String,
    pub version: String,
    pub protocol: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: "sidecar-client".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            protocol: DEFAULT_PROTOCOL.to_string(),
        }
    }
}

/// Channel capacities for consumers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BufferConfig {
    /// Output buffer of global (whole-session) subscriptions.
    pub events: usize,
    /// Output buffer of request-scoped subscriptions.
    pub requests: usize,
    /// Partial-message channel of a stream.
    pub partials: usize,
    /// Output channel of the turn collector.
    pub turns: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            events: 256,
            requests: 256,
            partials: 64,
            turns: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    resolve_config(global_config_path().as_deref(), project_dir, |key| {
        std::env::var(key).ok()
    })
}

/// Resolve configuration from an explicit global file and an environment
/// lookup. [`load_config`] passes the real ones.
pub fn resolve_config(
    global_path: Option<&Path>,
    project_dir: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_path
        && global_path.exists()
    {
        config = load_config_file(global_path)?;
    }

    if let Some(dir) = project_dir {
        let project_path = dir.join(".sidecar").join("settings.json");
        if project_path.exists() {
            merge_config_file(&mut config, &project_path)?;
        }
    }

    apply_env_overrides(&mut config, env);
    validate(&config)?;

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".sidecar").join("settings.json"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/sidecar/settings.json"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("sidecar").join("settings.json"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

/// Load a single config file, defaults filling any missing fields.
pub fn load_config_file(path: &Path) -> Result<Config> {
    let content = read_config_file(path)?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn read_config_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })
}

/// Overlay only the keys present in `path` onto `base`.
fn merge_config_file(base: &mut Config, path: &Path) -> Result<()> {
    let content = read_config_file(path)?;
    let overlay: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })?;
    let mut merged = serde_json::to_value(&*base)?;
    merge_json(&mut merged, overlay);
    *base = serde_json::from_value(merged).map_err(|e| {
        Error::Config(format!("Invalid config in {}: {}", path.display(), e))
    })?;
    tracing::debug!(path = %path.display(), "Merged config file");
    Ok(())
}

fn merge_json(base: &mut serde_json::Value, overlay: serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overlay)) => {
            for (key, value) in overlay {
                merge_json(base.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn apply_env_overrides(config: &mut Config, env: impl Fn(&str) -> Option<String>) {
    if let Some(val) = env("SIDECAR_CLIENT_NAME") {
        config.client.name = val;
    }
    if let Some(val) = env("SIDECAR_PROTOCOL") {
        config.client.protocol = val;
    }
    if let Some(val) = env("SIDECAR_EVENT_BUFFER")
        && let Ok(n) = val.parse()
    {
        config.buffers.events = n;
        config.buffers.requests = n;
    }
    if let Some(val) = env("SIDECAR_LOG_LEVEL") {
        config.logging.level = val;
    }
    if let Some(val) = env("SIDECAR_LOG_JSON") {
        config.logging.json = matches!(val.as_str(), "1" | "true" | "yes");
    }
}

/// Reject configurations that would build zero-capacity channels.
pub fn validate(config: &Config) -> Result<()> {
    let buffers = &config.buffers;
    for (name, value) in [
        ("buffers.events", buffers.events),
        ("buffers.requests", buffers.requests),
        ("buffers.partials", buffers.partials),
        ("buffers.turns", buffers.turns),
    ] {
        if value == 0 {
            return Err(Error::Config(format!("{name} must be greater than zero")));
        }
    }
    if config.client.protocol.is_empty() {
        return Err(Error::Config("client.protocol must not be empty".into()));
    }
    Ok(())
}
