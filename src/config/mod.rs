//! Configuration storage

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";
const DEFAULT_TYPING_QUIET_MS: u64 = 1000;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Username this client acts as
    pub username: Option<String>,
    /// Base URL of the history service (`/users`, `/messages`)
    pub backend_url: String,
    /// WebSocket URL of the transport channel. Derived from `backend_url` when unset.
    pub channel_url: Option<String>,
    /// Quiet period before `stop_typing` is sent, in milliseconds
    pub typing_quiet_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            username: None,
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            channel_url: None,
            typing_quiet_ms: DEFAULT_TYPING_QUIET_MS,
        }
    }
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "chat-cli", "chat-cli")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from disk, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        let mut config = if path.exists() {
            let content = fs::read_to_string(&path).context("Failed to read config file")?;
            Self::parse(&content)?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// `CHAT_USERNAME`, `CHAT_BACKEND_URL` and `CHAT_CHANNEL_URL` win over the file.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(username) = var("CHAT_USERNAME").filter(|v| !v.is_empty()) {
            self.username = Some(username);
        }
        if let Some(url) = var("CHAT_BACKEND_URL").filter(|v| !v.is_empty()) {
            self.backend_url = url;
        }
        if let Some(url) = var("CHAT_CHANNEL_URL").filter(|v| !v.is_empty()) {
            self.channel_url = Some(url);
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir).context("Failed to create config directory")?;

        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;

        tracing::debug!("Config written to {}", path.display());
        Ok(())
    }

    /// Configured username, or an error telling the user how to set one.
    pub fn require_username(&self) -> Result<&str> {
        self.username
            .as_deref()
            .filter(|u| !u.is_empty())
            .context("No username configured. Run 'chat-cli init --username <name>' first.")
    }

    /// Transport channel URL: explicit setting, or the backend URL with a
    /// WebSocket scheme and `/ws` path.
    pub fn channel_url(&self) -> String {
        if let Some(ref url) = self.channel_url {
            return url.clone();
        }
        let base = self
            .backend_url
            .trim_end_matches('/')
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!("{}/ws", base)
    }

    pub fn typing_quiet_period(&self) -> Duration {
        Duration::from_millis(self.typing_quiet_ms)
    }
}

/// Write username and backend into the config file.
pub fn init(username: &str, backend: Option<&str>) -> Result<()> {
    anyhow::ensure!(!username.trim().is_empty(), "Username must not be empty");

    let mut config = Config::load()?;
    config.username = Some(username.trim().to_string());
    if let Some(url) = backend {
        url::Url::parse(url).with_context(|| format!("Invalid backend URL '{}'", url))?;
        config.backend_url = url.to_string();
    }
    config.save()?;

    println!("Configured as '{}' against {}", username.trim(), config.backend_url);
    Ok(())
}
