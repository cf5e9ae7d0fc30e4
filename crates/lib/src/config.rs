//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.pustaka/config.json`) and
//! environment. Kept minimal: backend base URL and the retrieval knobs that
//! are forwarded verbatim with every chat request.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Backend API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Chat retrieval settings (engine policy knobs, passed through as-is).
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Backend API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    /// Base URL of the backend (default "http://localhost:8000").
    /// Overridden by PUSTAKA_API_URL env when set.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

/// Retrieval parameters sent with every chat request. The client does not
/// interpret these; the backend does.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfig {
    /// Result-count bound for retrieval (default 4).
    #[serde(default = "default_top_k")]
    pub top_k: u32,

    /// Retrieval method selector (default "hybrid").
    #[serde(default = "default_method")]
    pub method: String,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_top_k() -> u32 {
    4
}

fn default_method() -> String {
    "hybrid".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            method: default_method(),
        }
    }
}

/// Resolve the backend base URL: env PUSTAKA_API_URL overrides config.
pub fn resolve_api_url(config: &Config) -> String {
    std::env::var("PUSTAKA_API_URL")
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .unwrap_or_else(|| config.api.base_url.clone())
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("PUSTAKA_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".pustaka").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the default path (or PUSTAKA_CONFIG_PATH). Missing file
/// => default config. Returns the config and the path that was used (for
/// resolving sibling files such as the credential file).
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

/// Create the config directory and a default config file if they do not exist.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        std::fs::write(config_path, b"{}")
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    }

    Ok(config_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_chat_knobs() {
        let c = Config::default();
        assert_eq!(c.chat.top_k, 4);
        assert_eq!(c.chat.method, "hybrid");
        assert_eq!(c.api.base_url, "http://localhost:8000");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let c: Config = serde_json::from_str(r#"{"api":{"baseUrl":"http://10.0.0.2:9000"}}"#)
            .expect("parse");
        assert_eq!(c.api.base_url, "http://10.0.0.2:9000");
        assert_eq!(c.chat.top_k, 4);
        assert_eq!(c.chat.method, "hybrid");
    }

    #[test]
    fn unknown_method_is_kept_verbatim() {
        let c: Config =
            serde_json::from_str(r#"{"chat":{"topK":8,"method":"dense"}}"#).expect("parse");
        assert_eq!(c.chat.top_k, 8);
        assert_eq!(c.chat.method, "dense");
    }
}
