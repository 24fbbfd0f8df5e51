//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Configuration for oreo
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Inference server address
    pub base_url: Option<String>,
    /// Default model to chat with
    pub model: Option<String>,
    /// Read timeout in seconds
    pub timeout_secs: Option<u64>,
    /// System prompt sent at the start of every conversation
    pub system_prompt: Option<String>,
    /// Sampling temperature (0.1 - 2.0)
    pub temperature: Option<f64>,
    /// Maximum tokens per reply
    pub max_tokens: Option<u32>,
    /// Stream replies as they are generated
    pub stream: Option<bool>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("oreo")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("OREO_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file, falling back to defaults
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), "failed to parse config file: {}", e);
                eprintln!("Warning: Failed to parse config file: {}", e);
                Self::default()
            }),
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            base_url: Some(oreo_client::config::DEFAULT_BASE_URL.to_string()),
            model: Some(oreo_client::config::DEFAULT_MODEL.to_string()),
            timeout_secs: Some(300),
            system_prompt: None,
            temperature: Some(0.6),
            max_tokens: Some(1000),
            stream: Some(true),
        };

        default_config.save()?;
        Ok(path)
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# oreo configuration file
# Place at ~/.config/oreo/config.toml (Linux), ~/Library/Application Support/oreo/config.toml (Mac)
# or set OREO_CONFIG_PATH

# Inference server address
base_url = "http://localhost:11434"

# Model to chat with
model = "deepseek-r1:14b"

# Seconds to wait for a slow model before giving up
timeout_secs = 300

# Optional system prompt
# system_prompt = "You are a concise assistant."

# Sampling temperature (0.1 - 2.0)
temperature = 0.6

# Maximum tokens per reply
max_tokens = 1000

# Print replies as they are generated
stream = true
"#
}
