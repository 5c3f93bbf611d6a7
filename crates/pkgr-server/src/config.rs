use anyhow::Context;
use pkgr_core::Id;
use pkgr_runtime::DEFAULT_FETCH_TIMEOUT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

/// Config file read when neither `--config` nor `PKGR_CONFIG` names one.
pub const DEFAULT_CONFIG_PATH: &str = "pkgr.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address, e.g. "0.0.0.0:8080"
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directives; `RUST_LOG` takes precedence when set.
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT.as_secs()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Static API tokens and the users they act as.
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub token: String,
    pub user_id: Id,
}

impl AppConfig {
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

/// Load the config named by `explicit`, then `PKGR_CONFIG`, then
/// [`DEFAULT_CONFIG_PATH`].
///
/// A file that was named explicitly must exist. The default file is optional
/// and its absence yields the built-in defaults.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<AppConfig> {
    let named = explicit
        .map(Path::to_path_buf)
        .or_else(|| env::var_os("PKGR_CONFIG").map(PathBuf::from));

    let path = match named {
        Some(path) => path,
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if !path.exists() {
                return Ok(AppConfig::default());
            }
            path
        }
    };

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    AppConfig::from_toml(&raw).with_context(|| format!("invalid config {}", path.display()))
}
