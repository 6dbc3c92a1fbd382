//! Configuration loading for Atelier.
//!
//! The config file lives at `~/.atelier/config.toml`. Every section is optional; a
//! missing file resolves to defaults. `ATELIER_API_BASE_URL` overrides `api.base_url`,
//! and `${VAR}` references inside string values are expanded from the environment.

use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5001";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_LOGIN_PATH: &str = "/login";
pub const BASE_URL_ENV: &str = "ATELIER_API_BASE_URL";

#[derive(Debug, Default, Deserialize)]
pub struct AtelierConfig {
    pub api: Option<ApiConfig>,
    pub session: Option<SessionConfig>,
    pub perf: Option<PerfConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiConfig {
    pub base_url: Option<String>,
    /// Per-call timeout; a call that exceeds it is reported as unreachable.
    pub timeout_ms: Option<u64>,
    /// Where the outer layer should send the user after the session is invalidated.
    pub login_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionConfig {
    /// Location of the durable token slot.
    pub token_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PerfConfig {
    /// `auto`, `idle`, or `timer`.
    pub idle_backend: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

/// `~/.atelier`, the root for config, logs, and the session slot.
#[must_use]
pub fn atelier_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".atelier"))
}

fn config_path() -> Option<PathBuf> {
    atelier_dir().map(|dir| dir.join("config.toml"))
}

pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                if !var.is_empty() {
                    out.push_str(&env::var(var).unwrap_or_default());
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

impl AtelierConfig {
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    /// Load from an explicit path. `Ok(None)` when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        Self::parse(&content)
            .map(Some)
            .map_err(|source| {
                tracing::warn!("Failed to parse config at {:?}: {}", path, source);
                ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                }
            })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }
}

/// Fully resolved transport and session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub base_url: String,
    pub timeout: Duration,
    pub login_path: String,
    /// `None` when no home directory could be determined; the session is then memory-only.
    pub token_path: Option<PathBuf>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            token_path: default_token_path(),
        }
    }
}

fn default_token_path() -> Option<PathBuf> {
    atelier_dir().map(|dir| dir.join("session").join("token"))
}

impl ClientSettings {
    /// Resolve settings from an optional config and the process environment.
    #[must_use]
    pub fn resolve(config: Option<&AtelierConfig>) -> Self {
        Self::resolve_with_env(config, env::var(BASE_URL_ENV).ok())
    }

    /// Like [`ClientSettings::resolve`] but with the base-URL override passed explicitly.
    #[must_use]
    pub fn resolve_with_env(config: Option<&AtelierConfig>, base_url_env: Option<String>) -> Self {
        let defaults = Self::default();
        let api = config.and_then(|cfg| cfg.api.as_ref());
        let session = config.and_then(|cfg| cfg.session.as_ref());

        let base_url = base_url_env
            .filter(|value| !value.trim().is_empty())
            .or_else(|| {
                api.and_then(|api| api.base_url.as_deref())
                    .map(expand_env_vars)
                    .filter(|value| !value.trim().is_empty())
            })
            .unwrap_or(defaults.base_url);

        let timeout = api
            .and_then(|api| api.timeout_ms)
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.timeout);

        let login_path = api
            .and_then(|api| api.login_path.as_deref())
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(ToString::to_string)
            .unwrap_or(defaults.login_path);

        let token_path = session
            .and_then(|session| session.token_path.clone())
            .or(defaults.token_path);

        Self {
            base_url,
            timeout,
            login_path,
            token_path,
        }
    }
}

/// Raw idle-backend choice from `[perf]`, `"auto"` when unset.
#[must_use]
pub fn idle_backend_choice(config: Option<&AtelierConfig>) -> String {
    config
        .and_then(|cfg| cfg.perf.as_ref())
        .and_then(|perf| perf.idle_backend.as_deref())
        .map(|raw| raw.trim().to_ascii_lowercase())
        .filter(|raw| !raw.is_empty())
        .unwrap_or_else(|| "auto".to_string())
}
