use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logger::MAX_LOGS;

/// Environment variables with this prefix override file values,
/// e.g. `POCKET_PORT=8080`.
pub const ENV_PREFIX: &str = "POCKET_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Figment(#[from] Box<figment::Error>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    pub host: String,
    pub port: u16,
    /// Directory all static lookups are confined to.
    pub root_dir: PathBuf,
    /// Entries kept by the in-memory request log.
    pub max_logs: usize,
    /// Largest request body accepted, in bytes.
    pub max_body_bytes: usize,
    /// Idle time allowed while reading a request. 0 = no timeout.
    pub read_timeout_ms: u64,
    /// Write the placeholder site into `root_dir` on startup.
    pub provision: bool,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
            root_dir: PathBuf::from("public/static"),
            max_logs: MAX_LOGS,
            max_body_bytes: 1024 * 1024,
            read_timeout_ms: 10_000,
            provision: true,
        }
    }
}

impl ServeConfig {
    /// Defaults, then the optional TOML file, then `POCKET_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::figment(path).extract().map_err(|e| ConfigError::Figment(Box::new(e)))
    }

    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }
}
