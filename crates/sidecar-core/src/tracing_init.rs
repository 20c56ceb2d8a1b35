//! Shared tracing/logging initialization.
//!
//! Binaries embedding a sidecar client call this once at startup; the
//! library itself never installs a subscriber.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Crates whose log level the `logging.level` setting controls.
pub const CLIENT_CRATES: &[&str] = &["sidecar_client", "sidecar_core"];

/// Default filter when neither `RUST_LOG` nor the config names one.
pub const DEFAULT_FILTER: &str = "sidecar_client=info,sidecar_core=info";

/// Expand a configured level into filter directives.
///
/// A bare level (`"debug"`) applies to the client crates only, so embedding
/// binaries keep their own verbosity. Anything containing `=` or `,` is
/// already a directive list and is used as given.
pub fn filter_directives(level: &str) -> String {
    let level = level.trim();
    if level.is_empty() {
        return DEFAULT_FILTER.to_string();
    }
    if level.contains(['=', ',']) {
        return level.to_string();
    }
    CLIENT_CRATES
        .iter()
        .map(|krate| format!("{krate}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialise the global tracing subscriber.
///
/// * `default_filter` -- directives used when `RUST_LOG` is not set
///   (e.g. [`DEFAULT_FILTER`]).
/// * `log_json` -- when `true`, emit structured JSON log lines instead of the
///   human-readable format.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(default_filter: &str, log_json: bool) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = if log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    installed.map_err(|e| Error::Tracing(e.to_string()))
}

/// Initialise tracing from the `logging` config section.
pub fn init_from_config(logging: &LoggingConfig) -> Result<()> {
    init_tracing(&filter_directives(&logging.level), logging.json)
}
