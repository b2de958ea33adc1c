//! Configuration file support

use jot_ai::ChatMode;
use jot_ai::client::DEFAULT_SERVER_URL;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Env var overriding the config file location
const CONFIG_PATH_ENV: &str = "JOT_CONFIG_PATH";
/// Env var holding the bearer token when the config has none
const TOKEN_ENV: &str = "JOT_TOKEN";

/// Configuration for jot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Journal backend URL
    pub server_url: Option<String>,
    /// Bearer token for the backend
    pub token: Option<String>,
    /// Default model to use
    pub model: Option<String>,
    /// Default chat mode (simple, reasoning)
    pub mode: Option<String>,
    /// Custom system prompt file path
    pub system_prompt_file: Option<String>,
    /// Whether to use TUI mode by default
    pub tui: Option<bool>,
    /// Color theme (dark, light)
    pub theme: Option<String>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("jot")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default location
    ///
    /// A missing file gives the defaults; a broken one is reported and ignored.
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: Failed to load config file: {}", e);
                Self::default()
            }
        }
    }

    /// Load config from a specific file
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save config to a specific file
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        Self::init_at(&path)?;
        Ok(path)
    }

    fn init_at(path: &Path) -> std::io::Result<()> {
        if path.exists() {
            return Ok(());
        }
        let default_config = Config {
            server_url: Some(DEFAULT_SERVER_URL.to_string()),
            mode: Some(ChatMode::Simple.as_str().to_string()),
            tui: Some(true),
            theme: Some("dark".to_string()),
            ..Default::default()
        };
        default_config.save_to(path)
    }

    pub fn server_url(&self) -> String {
        self.server_url
            .clone()
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
    }

    /// Token from the config, falling back to the environment
    pub fn token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var(TOKEN_ENV).ok())
            .filter(|t| !t.trim().is_empty())
    }

    /// Configured chat mode; unknown values fall back to simple
    pub fn chat_mode(&self) -> ChatMode {
        self.mode
            .as_deref()
            .and_then(ChatMode::parse)
            .unwrap_or_default()
    }

    /// Contents of the system prompt file, if configured and readable
    pub fn system_prompt(&self) -> Option<String> {
        let file = self.system_prompt_file.as_deref()?;
        let path = expand_home(file);
        match fs::read_to_string(&path) {
            Ok(prompt) if !prompt.trim().is_empty() => Some(prompt.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("Cannot read system prompt {}: {}", path.display(), e);
                None
            }
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# jot configuration file
# Place at ~/.config/jot/config.toml (Linux), ~/Library/Application Support/jot/config.toml (Mac)
# or %APPDATA%\jot\config.toml (Windows). Override with JOT_CONFIG_PATH.

# Journal backend
server_url = "http://localhost:8000"

# Bearer token (or set JOT_TOKEN)
# token = "..."

# Default model; the first model the backend lists is used when unset
# model = "qwen3:8b"

# Chat mode: simple or reasoning
mode = "simple"

# Custom system prompt file (optional)
# system_prompt_file = "~/.config/jot/system_prompt.txt"

# Whether to use TUI mode by default
tui = true

# Color theme: dark or light
theme = "dark"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_example_config_parses() {
        let config: Config = toml::from_str(example_config()).unwrap();
        assert_eq!(config.server_url(), "http://localhost:8000");
        assert_eq!(config.chat_mode(), ChatMode::Simple);
        assert_eq!(config.tui, Some(true));
        assert_eq!(config.model, None);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str("mode = \"reasoning\"").unwrap();
        assert_eq!(config.chat_mode(), ChatMode::Reasoning);
        assert_eq!(config.server_url(), DEFAULT_SERVER_URL);

        let odd: Config = toml::from_str("mode = \"deep\"").unwrap();
        assert_eq!(odd.chat_mode(), ChatMode::Simple);
    }

    #[test]
    fn test_init_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Config::init_at(&path).unwrap();
        let written = Config::load_from(&path).unwrap();
        assert_eq!(written.tui, Some(true));

        fs::write(&path, "model = \"mine\"").unwrap();
        Config::init_at(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap().model.as_deref(), Some("mine"));
    }

    #[test]
    fn test_system_prompt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        fs::write(&path, "  Be kind.\n").unwrap();

        let config = Config {
            system_prompt_file: Some(path.display().to_string()),
            ..Default::default()
        };
        assert_eq!(config.system_prompt().as_deref(), Some("Be kind."));

        let missing = Config {
            system_prompt_file: Some(dir.path().join("nope").display().to_string()),
            ..Default::default()
        };
        assert_eq!(missing.system_prompt(), None);
    }
}
