use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::llm::{DEFAULT_BASE_URL, DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_TEMPERATURE};

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Gemini API key
    pub api_key: Option<String>,

    /// Model used for generation
    pub model: String,

    /// Optional system instruction sent with every request
    pub system_instruction: Option<String>,

    /// API root, without the `/models/...` suffix
    pub base_url: String,

    pub temperature: f64,

    pub max_output_tokens: u32,

    /// Where conversations are stored
    pub data_dir: PathBuf,

    /// File this config was loaded from and is saved back to
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Model for this run only (`--model`); never written to disk
    #[serde(skip)]
    pub model_override: Option<String>,
}

fn nova_home() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
    home.join(".nova")
}

impl Default for Config {
    fn default() -> Self {
        let nova_home = nova_home();

        Config {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            system_instruction: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            data_dir: nova_home.clone(),
            config_path: nova_home.join("config.toml"),
            model_override: None,
        }
    }
}

impl Config {
    /// Load configuration from `path`, or `~/.nova/config.toml` when none is
    /// given. A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => nova_home().join("config.toml"),
        };

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            toml::from_str(&content)
                .context("Failed to parse config file")?
        } else {
            Config::default()
        };

        config.config_path = config_path;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }
        let content = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;
        fs::write(&self.config_path, content)
            .context("Failed to write config file")?;
        Ok(())
    }

    pub fn chats_path(&self) -> PathBuf {
        self.data_dir.join("chats.json")
    }

    /// Check if API key is configured
    pub fn has_api_key(&self) -> bool {
        self.get_api_key().is_some()
    }

    /// Get API key from config or environment
    pub fn get_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|key| !key.trim().is_empty()))
    }

    pub fn set_api_key(&mut self, key: String) {
        self.api_key = Some(key.trim().to_string());
    }

    /// Persisted model choice; also ends any `--model` override
    pub fn set_model(&mut self, model: String) {
        self.model = model.trim().to_string();
        self.model_override = None;
    }

    pub fn set_model_override(&mut self, model: String) {
        self.model_override = Some(model.trim().to_string()).filter(|model| !model.is_empty());
    }

    /// The model requests go to: the override when present, else the saved one
    pub fn active_model(&self) -> &str {
        self.model_override.as_deref().unwrap_or(&self.model)
    }

    /// Empty or whitespace-only text clears the instruction
    pub fn set_system_instruction(&mut self, text: Option<String>) {
        self.system_instruction = text
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
    }
}
