//! /temp and /stream

use super::CommandResult;
use oreo_client::ChatOptions;
use serde_json::{Map, Value};

pub const MIN_TEMPERATURE: f64 = 0.1;
pub const MAX_TEMPERATURE: f64 = 2.0;

/// Keep a temperature inside the range the frontend offers
pub fn clamp_temperature(value: f64) -> f64 {
    if value.is_nan() {
        return ChatOptions::default().temperature;
    }
    value.clamp(MIN_TEMPERATURE, MAX_TEMPERATURE)
}

/// Per-call chat parameters chosen by the user
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    pub temperature: f64,
    pub max_tokens: u32,
    pub stream: bool,
    pub extra: Map<String, Value>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        let options = ChatOptions::default();
        Self {
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: true,
            extra: Map::new(),
        }
    }
}

impl ChatSettings {
    pub fn options(&self) -> ChatOptions {
        let mut options = ChatOptions::default()
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);
        options.extra = self.extra.clone();
        options
    }
}

pub struct SettingsCommand;

impl SettingsCommand {
    pub fn temperature(args: &str, settings: &ChatSettings) -> CommandResult {
        if args.is_empty() {
            return CommandResult::Message(format!("Temperature: {:.1}", settings.temperature));
        }
        match args.parse::<f64>() {
            Ok(value) => CommandResult::SetTemperature(clamp_temperature(value)),
            Err(_) => CommandResult::Message(format!(
                "Not a temperature: '{}' (expected {} - {})",
                args, MIN_TEMPERATURE, MAX_TEMPERATURE
            )),
        }
    }

    pub fn stream(args: &str, settings: &ChatSettings) -> CommandResult {
        match args.to_lowercase().as_str() {
            "" => CommandResult::Message(format!(
                "Streaming: {}",
                if settings.stream { "on" } else { "off" }
            )),
            "on" | "true" | "1" => CommandResult::SetStream(true),
            "off" | "false" | "0" => CommandResult::SetStream(false),
            other => CommandResult::Message(format!("Usage: /stream on|off (got '{}')", other)),
        }
    }
}
