use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{RenderError, Result};

/// Service configuration. Defaults are production values; a TOML file can
/// override any field and CLI flags override the file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address the HTTP listener binds to.
    pub listen: SocketAddr,
    /// Maximum simultaneous renders; excess requests queue on the gate.
    pub max_concurrent_renders: usize,
    /// Explicit Chromium binary path; autodetected when unset.
    pub chrome_executable: Option<PathBuf>,
    /// DevTools websocket URL of an already-running engine; when set the
    /// service connects instead of launching its own process.
    pub chrome_endpoint: Option<String>,
    /// Directory temp artifacts are written to.
    pub tmp_dir: PathBuf,
    /// Optional JSON manifest mapping logo names to image files.
    pub logo_manifest: Option<PathBuf>,
    /// Ceiling for navigation + page readiness, seconds.
    pub navigation_timeout_secs: u64,
    /// How long to wait for a requested selector to appear, seconds.
    pub selector_timeout_secs: u64,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Default directive when RUST_LOG is unset, e.g. "info" or "hardcopy=debug".
    pub level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Compact,
    Json,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: ([0, 0, 0, 0], 8080).into(),
            max_concurrent_renders: 10,
            chrome_executable: None,
            chrome_endpoint: None,
            tmp_dir: PathBuf::from("/tmp"),
            logo_manifest: None,
            navigation_timeout_secs: 60,
            selector_timeout_secs: 10,
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Compact,
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RenderError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&raw)
            .map_err(|e| RenderError::Config(format!("failed to parse {}: {e}", path.display())))
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn selector_timeout(&self) -> Duration {
        Duration::from_secs(self.selector_timeout_secs)
    }
}
