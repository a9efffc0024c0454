use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::model::AudioFormat;
use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub pandora: PandoraConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PandoraConfig {
    #[serde(default)]
    pub username: String,
    /// Stored in plain text when set; prefer the env var or the prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub audio_format: AudioFormat,
    /// Station to start on (matched by name, case-insensitive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_station: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_volume")]
    pub volume: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    /// How many previously played tracks the history pane keeps.
    #[serde(default = "default_history_len")]
    pub history_len: usize,
}

impl Default for PandoraConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: None,
            audio_format: AudioFormat::default(),
            default_station: None,
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            volume: default_volume(),
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            history_len: default_history_len(),
        }
    }
}

fn default_volume() -> f32 {
    0.8
}

fn default_history_len() -> usize {
    50
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Read `path`, writing the defaults there first if it does not exist.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
