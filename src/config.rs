//! Configuration for cardshift, read from `.cardshift/cardshift.toml`.
//!
//! Layered file → environment → CLI, later layers winning.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! base_url = "http://127.0.0.1:3141"
//! project_id = 1
//!
//! [sync]
//! debounce_ms = 50
//!
//! [highlight]
//! enabled = true
//! same_column_color = "#3b82f6"
//! cross_column_color = "#22c55e"
//! ```
//!
//! Environment overrides: `CARDSHIFT_BASE_URL`, `CARDSHIFT_PROJECT_ID`,
//! `CARDSHIFT_DEBOUNCE_MS`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_DIR: &str = ".cardshift";
pub const CONFIG_FILE: &str = "cardshift.toml";

/// Where the board server lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_project_id")]
    pub project_id: i64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:3141".to_string()
}

fn default_project_id() -> i64 {
    1
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            project_id: default_project_id(),
        }
    }
}

/// Move submission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Quiet period before a card's latest move is sent
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    50
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Flash colours for moved cards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightConfig {
    #[serde(default = "default_highlight_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub same_column_color: Option<String>,
    #[serde(default)]
    pub cross_column_color: Option<String>,
}

fn default_highlight_enabled() -> bool {
    true
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            enabled: default_highlight_enabled(),
            same_column_color: Some("#3b82f6".to_string()),
            cross_column_color: Some("#22c55e".to_string()),
        }
    }
}

impl HighlightConfig {
    /// Colour override for a move; `None` leaves the choice to the view.
    pub fn color_for(&self, cross_column: bool) -> Option<String> {
        if cross_column {
            self.cross_column_color.clone()
        } else {
            self.same_column_color.clone()
        }
    }
}

/// Contents of `cardshift.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardshiftConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub highlight: HighlightConfig,
}

impl CardshiftConfig {
    /// Default location of the config file under `project_dir`.
    pub fn default_path(project_dir: &Path) -> PathBuf {
        project_dir.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid cardshift.toml")
    }

    /// Load `path` if it exists, otherwise start from defaults. Environment
    /// overrides are applied in both cases.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            Self::load(path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("CARDSHIFT_BASE_URL") {
            self.server.base_url = url;
        }
        if let Some(id) = lookup("CARDSHIFT_PROJECT_ID") {
            self.server.project_id = id
                .trim()
                .parse()
                .with_context(|| format!("CARDSHIFT_PROJECT_ID is not an integer: {}", id))?;
        }
        if let Some(ms) = lookup("CARDSHIFT_DEBOUNCE_MS") {
            self.sync.debounce_ms = ms
                .trim()
                .parse()
                .with_context(|| format!("CARDSHIFT_DEBOUNCE_MS is not an integer: {}", ms))?;
        }
        Ok(())
    }

    /// Non-fatal problems worth telling the user about.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.base_url.trim().is_empty() {
            warnings.push("server.base_url is empty".to_string());
        } else if !self.server.base_url.starts_with("http://")
            && !self.server.base_url.starts_with("https://")
        {
            warnings.push(format!(
                "server.base_url '{}' should start with http:// or https://",
                self.server.base_url
            ));
        }

        if self.sync.debounce_ms == 0 {
            warnings.push(
                "sync.debounce_ms is 0: every drag event will be sent to the server".to_string(),
            );
        }

        for (key, color) in [
            ("highlight.same_column_color", &self.highlight.same_column_color),
            ("highlight.cross_column_color", &self.highlight.cross_column_color),
        ] {
            if let Some(color) = color
                && !is_hex_color(color)
            {
                warnings.push(format!("{} '{}' is not a #rrggbb colour", key, color));
            }
        }

        warnings
    }
}

fn is_hex_color(s: &str) -> bool {
    s.len() == 7 && s.starts_with('#') && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}
