//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// Default address of a local inference server
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Default model identifier
pub const DEFAULT_MODEL: &str = "deepseek-r1:14b";

/// Markers delimiting a reasoning block in model output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningMarkers {
    pub open: String,
    pub close: String,
}

impl Default for ReasoningMarkers {
    fn default() -> Self {
        Self {
            open: "<think>".to_string(),
            close: "</think>".to_string(),
        }
    }
}

/// Configuration consumed by `ChatSession` and `HttpTransport`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server base URL, without trailing slash
    pub base_url: String,
    /// Model used for chat requests
    pub model: String,
    /// Time allowed to establish a connection
    #[serde(with = "secs")]
    pub connect_timeout: Duration,
    /// Time allowed between reads of a response
    #[serde(with = "secs")]
    pub read_timeout: Duration,
    /// Optional leading system turn
    pub system_prompt: Option<String>,
    /// Reasoning block markers
    pub reasoning: ReasoningMarkers,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(300),
            system_prompt: None,
            reasoning: ReasoningMarkers::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the system prompt. Whitespace-only prompts are treated as absent.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = normalize_prompt(Some(prompt.into()));
        self
    }

    pub fn with_reasoning_markers(mut self, open: impl Into<String>, close: impl Into<String>) -> Self {
        self.reasoning = ReasoningMarkers {
            open: open.into(),
            close: close.into(),
        };
        self
    }

    /// Trimmed system prompt, `None` if empty
    pub fn system_prompt(&self) -> Option<String> {
        normalize_prompt(self.system_prompt.clone())
    }

    /// Check the configuration before building a client
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(Error::InvalidConfig(format!(
                "base URL must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }
        if self.model.trim().is_empty() {
            return Err(Error::InvalidConfig("model must not be empty".into()));
        }
        if self.connect_timeout.is_zero() || self.read_timeout.is_zero() {
            return Err(Error::InvalidConfig("timeouts must be non-zero".into()));
        }
        if self.reasoning.open.is_empty() || self.reasoning.close.is_empty() {
            return Err(Error::InvalidConfig(
                "reasoning markers must not be empty".into(),
            ));
        }
        Ok(())
    }
}

fn normalize_prompt(prompt: Option<String>) -> Option<String> {
    prompt
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
