//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tern_chat::{AttachmentLimits, CyclerConfig};
use tern_wire::Framing;

/// Configuration for tern
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend base URL, e.g. https://chat.example.com/api
    pub base_url: Option<String>,
    /// Agent to talk to
    pub agent_id: Option<String>,
    /// Conversation id; a fresh one is generated when unset
    pub chat_id: Option<String>,
    /// Model override sent with every message
    pub model_id: Option<String>,
    /// Bearer token (alternative to TERN_API_KEY)
    pub api_key: Option<String>,
    /// How the response body separates records
    pub framing: Framing,
    pub attachments: AttachmentLimits,
    pub status: CyclerConfig,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tern")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("TERN_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Write the example config if no config file exists yet
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, example_config())?;
        Ok(path)
    }

    /// API key from config, falling back to TERN_API_KEY
    pub fn get_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("TERN_API_KEY").ok())
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# tern configuration file
# Place at ~/.config/tern/config.toml (Linux/Mac) or %APPDATA%\tern\config.toml (Windows)

# Chat backend
base_url = "http://localhost:3000/api"

# Agent to talk to
agent_id = "default"

# Conversation id (a new one is generated per run when unset)
# chat_id = "..."

# Model override (optional)
# model_id = "gpt-4o"

# Bearer token (optional - TERN_API_KEY is also honored)
# api_key = "..."

# Response framing: "object-adjacency" or "newline-delimited"
framing = "object-adjacency"

[attachments]
max_files = 10
max_file_size = 10485760

[status]
tool_interval_ms = 2000
general_interval_ms = 3000
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_example_config_parses() {
        let config: Config = toml::from_str(example_config()).unwrap();
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:3000/api"));
        assert_eq!(config.agent_id.as_deref(), Some("default"));
        assert!(config.chat_id.is_none());
        assert_eq!(config.framing, Framing::ObjectAdjacency);
        assert_eq!(config.attachments, AttachmentLimits::default());
        assert_eq!(config.status, CyclerConfig::default());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
framing = "newline-delimited"

[status]
tool_interval_ms = 750
"#,
        )
        .unwrap();
        assert_eq!(config.framing, Framing::NewlineDelimited);
        assert_eq!(config.status.tool_interval, Duration::from_millis(750));
        assert_eq!(config.status.general_interval, Duration::from_millis(3000));
        assert_eq!(config.attachments.max_files, 10);
    }

    #[test]
    fn test_config_api_key_wins() {
        let config = Config {
            api_key: Some("from-file".into()),
            ..Default::default()
        };
        assert_eq!(config.get_api_key().as_deref(), Some("from-file"));
    }
}
