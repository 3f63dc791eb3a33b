//! Configuration for Onpoint.
//!
//! The file lives at `~/.onpoint/config.toml`. Every key is optional; string
//! values may reference environment variables as `${VAR}`. After the file is
//! read, a few environment variables override it:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `ONPOINT_API_URL` | `assistant.base_url` |
//! | `ONPOINT_WORKSPACE` | `workspace.root` |
//! | `ONPOINT_DEBOUNCE_MS` | `editor.debounce_ms` |
//!
//! [`OnpointConfig`] mirrors the file; [`Settings`] is the effective result
//! with defaults filled in.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use serde::Deserialize;
use thiserror::Error;

pub const API_URL_ENV: &str = "ONPOINT_API_URL";
pub const WORKSPACE_ENV: &str = "ONPOINT_WORKSPACE";
pub const DEBOUNCE_ENV: &str = "ONPOINT_DEBOUNCE_MS";

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_DEBOUNCE_MS: u64 = 1500;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Read { path, .. } | Self::Parse { path, .. } => path,
        }
    }
}

// ============================================================================
// File shape
// ============================================================================

#[derive(Debug, Default, Clone, Deserialize)]
pub struct OnpointConfig {
    pub assistant: Option<AssistantConfig>,
    pub editor: Option<EditorConfig>,
    pub workspace: Option<WorkspaceConfig>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct AssistantConfig {
    pub base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct EditorConfig {
    pub debounce_ms: Option<u64>,
    /// Re-analyze after typing pauses.
    pub auto_analyze: Option<bool>,
    /// Request a completion after typing pauses.
    pub auto_suggest: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct WorkspaceConfig {
    pub root: Option<String>,
    /// Snapshot the previous content of a file before each save.
    pub keep_versions: Option<bool>,
}

/// Replace `${VAR}` with the value of `VAR` (empty when unset).
///
/// An unterminated `${` and an empty `${}` are left as written.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(0) => {
                out.push_str("${}");
                rest = &after[1..];
            }
            Some(end) => {
                out.push_str(&env::var(&after[..end]).unwrap_or_default());
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

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".onpoint").join("config.toml"))
}

impl OnpointConfig {
    /// Load `~/.onpoint/config.toml`. `Ok(None)` when there is no file.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path).map_err(|source| {
            tracing::warn!(path = %path.display(), "Failed to read config: {source}");
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let config = toml::from_str(&content).map_err(|source| {
            tracing::warn!(path = %path.display(), "Failed to parse config: {source}");
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?;
        tracing::info!(path = %path.display(), "Loaded config");
        Ok(Some(config))
    }

    /// Effective settings, with environment overrides applied.
    #[must_use]
    pub fn resolve(&self) -> Settings {
        self.resolve_with(|key| env::var(key).ok())
    }

    /// Like [`resolve`](Self::resolve) with an injectable environment lookup.
    #[must_use]
    pub fn resolve_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Settings {
        let assistant = self.assistant.clone().unwrap_or_default();
        let editor = self.editor.clone().unwrap_or_default();
        let workspace = self.workspace.clone().unwrap_or_default();

        let base_url = lookup(API_URL_ENV)
            .filter(|url| !url.trim().is_empty())
            .or_else(|| assistant.base_url.as_deref().map(expand_env_vars))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let env_debounce = lookup(DEBOUNCE_ENV).and_then(|raw| match raw.trim().parse::<u64>() {
            Ok(ms) => Some(ms),
            Err(_) => {
                tracing::warn!(value = %raw, "Ignoring invalid {DEBOUNCE_ENV}");
                None
            }
        });
        let debounce_ms = env_debounce
            .or(editor.debounce_ms)
            .unwrap_or(DEFAULT_DEBOUNCE_MS);

        let root = lookup(WORKSPACE_ENV)
            .filter(|root| !root.trim().is_empty())
            .or_else(|| workspace.root.as_deref().map(expand_env_vars))
            .map_or_else(|| PathBuf::from("."), PathBuf::from);

        Settings {
            assistant: AssistantSettings {
                base_url,
                request_timeout: Duration::from_secs(
                    assistant
                        .request_timeout_secs
                        .filter(|secs| *secs > 0)
                        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
                ),
                max_retries: assistant.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            },
            editor: EditorSettings {
                debounce: Duration::from_millis(debounce_ms),
                auto_analyze: editor.auto_analyze.unwrap_or(true),
                auto_suggest: editor.auto_suggest.unwrap_or(true),
            },
            workspace: WorkspaceSettings {
                root,
                keep_versions: workspace.keep_versions.unwrap_or(true),
            },
        }
    }
}

// ============================================================================
// Effective settings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub assistant: AssistantSettings,
    pub editor: EditorSettings,
    pub workspace: WorkspaceSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantSettings {
    pub base_url: String,
    pub request_timeout: Duration,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditorSettings {
    pub debounce: Duration,
    pub auto_analyze: bool,
    pub auto_suggest: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceSettings {
    pub root: PathBuf,
    pub keep_versions: bool,
}

impl Default for Settings {
    fn default() -> Self {
        OnpointConfig::default().resolve_with(|_| None)
    }
}
