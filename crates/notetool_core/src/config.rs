use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const DEFAULT_USER_AGENT: &str = "notetool/0.1";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct NoteConfig {
    #[serde(default)]
    pub store: StoreSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct StoreSection {
    pub server_url: Option<String>,
    pub token: Option<String>,
    pub user_agent: Option<String>,
    pub timeout_ms: Option<u64>,
}

impl NoteConfig {
    /// Resolve the store server URL: env TRILIUM_SERVER > config > None.
    pub fn server_url(&self) -> Option<String> {
        if let Some(value) = non_empty_env("TRILIUM_SERVER") {
            return Some(value);
        }
        self.store.server_url.clone()
    }

    /// Resolve the ETAPI token: env TRILIUM_TOKEN > config > None.
    pub fn token(&self) -> Option<String> {
        if let Some(value) = non_empty_env("TRILIUM_TOKEN") {
            return Some(value);
        }
        self.store.token.clone()
    }

    /// Resolve user agent: env NOTETOOL_USER_AGENT > config > default.
    pub fn user_agent(&self) -> String {
        if let Some(value) = non_empty_env("NOTETOOL_USER_AGENT") {
            return value;
        }
        self.store
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    /// Resolve HTTP timeout: env NOTETOOL_HTTP_TIMEOUT_MS > config > default.
    pub fn timeout_ms(&self) -> u64 {
        if let Some(value) = non_empty_env("NOTETOOL_HTTP_TIMEOUT_MS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            return parsed;
        }
        self.store.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)
    }

    /// Fail early when the store connection cannot be configured. This is the
    /// only fatal configuration path; everything past it is per-note.
    pub fn require_connection(&self) -> Result<(String, String)> {
        let server_url = match self.server_url() {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => bail!(
                "no note store configured: set TRILIUM_SERVER (or [store].server_url in the config file)"
            ),
        };
        let token = match self.token() {
            Some(token) => token,
            None => bail!(
                "no ETAPI token configured: set TRILIUM_TOKEN (or [store].token in the config file)"
            ),
        };
        Ok((server_url, token))
    }
}

/// Load and parse a NoteConfig from a TOML file. Returns default if the file
/// does not exist.
pub fn load_config(config_path: &Path) -> Result<NoteConfig> {
    if !config_path.exists() {
        return Ok(NoteConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: NoteConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

fn non_empty_env(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim().to_string();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}
