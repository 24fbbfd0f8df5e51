//! Core types for chat and model management

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Message roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Get the role as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Parse a wire role name, `None` for anything unknown
    pub fn parse(name: &str) -> Option<Role> {
        match name {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// Missing, null or unrecognised roles all read as `None`
fn lenient_role<'de, D>(deserializer: D) -> std::result::Result<Option<Role>, D::Error>
where
    D: Deserializer<'de>,
{
    let name: Option<String> = Option::deserialize(deserializer)?;
    Ok(name.as_deref().and_then(Role::parse))
}

/// One turn of the conversation, as sent on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-call generation options
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOptions {
    /// Sampling temperature
    pub temperature: f64,
    /// Maximum tokens to generate (`num_predict` on the wire)
    pub max_tokens: u32,
    /// Extra pass-through options; cannot override `temperature` or `num_predict`
    pub extra: Map<String, Value>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.6,
            max_tokens: 1000,
            extra: Map::new(),
        }
    }
}

impl ChatOptions {
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Add a pass-through option
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Build the `options` object sent to the server.
    ///
    /// Extra keys go in first so the explicit `temperature` and `num_predict`
    /// always win on a name collision.
    pub fn to_wire(&self) -> Map<String, Value> {
        let mut options = self.extra.clone();
        options.insert("temperature".into(), Value::from(self.temperature));
        options.insert("num_predict".into(), Value::from(self.max_tokens));
        options
    }
}

/// Body of `POST /api/chat`
#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub stream: bool,
    pub options: Map<String, Value>,
}

/// Parsed body of a buffered chat reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Reply message as sent by the server; its role may be absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<RecordMessage>,
    #[serde(default)]
    pub done: bool,
    /// Remaining fields (timings, token counts, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Message inside a server reply or stream record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMessage {
    #[serde(
        default,
        deserialize_with = "lenient_role",
        skip_serializing_if = "Option::is_none"
    )]
    pub role: Option<Role>,
    #[serde(default)]
    pub content: String,
}

/// One decoded line of a streamed chat reply
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StreamRecord {
    #[serde(default)]
    pub message: Option<RecordMessage>,
    #[serde(default)]
    pub done: bool,
    /// Set when the server aborts the stream
    #[serde(default)]
    pub error: Option<String>,
}

impl StreamRecord {
    /// Role of this record's message, if any
    pub fn role(&self) -> Option<Role> {
        self.message.as_ref().and_then(|m| m.role)
    }

    /// Text carried by this record (empty when absent)
    pub fn content(&self) -> &str {
        self.message.as_ref().map(|m| m.content.as_str()).unwrap_or("")
    }
}

/// An installed model as reported by `GET /api/tags`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified_at: String,
}

impl ModelInfo {
    /// First 12 characters of the digest
    pub fn short_digest(&self) -> &str {
        let end = self
            .digest
            .char_indices()
            .nth(12)
            .map(|(i, _)| i)
            .unwrap_or(self.digest.len());
        &self.digest[..end]
    }

    /// Size in mebibytes
    pub fn size_mib(&self) -> f64 {
        self.size as f64 / 1024.0 / 1024.0
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TagsResponse {
    #[serde(default)]
    pub models: Option<Vec<ModelInfo>>,
}

/// Body of `POST /api/pull` and `DELETE /api/delete`
#[derive(Debug, Serialize)]
pub(crate) struct ModelName<'a> {
    pub name: &'a str,
}

/// One raw line of a pull stream
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct PullRecord {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub completed: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub error: Option<String>,
}

/// Progress of a model transfer, delivered to a `ProgressSink`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferProgress {
    pub model: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    pub completed: u64,
    pub total: u64,
    /// Overall progress in [0, 100]. Never decreases within a transfer, so
    /// once a layer finishes it stays at that layer's high-water mark while
    /// later layers download: read it as a lower bound, not an estimate.
    pub percentage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransferProgress {
    /// Progress of the layer this record reports on, in [0, 100].
    /// Restarts at zero when the server moves to the next digest.
    pub fn layer_percentage(&self) -> f64 {
        let ratio = self.completed as f64 / self.total.max(1) as f64 * 100.0;
        ratio.clamp(0.0, 100.0)
    }

    /// Whether this is the last record of a transfer
    pub fn is_terminal(&self) -> bool {
        self.error.is_some() || self.status == crate::transfer::STATUS_COMPLETE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_options_explicit_keys_win() {
        let options = ChatOptions::default()
            .with_temperature(0.8)
            .with_max_tokens(42)
            .with_option("temperature", 1.9)
            .with_option("num_predict", 7)
            .with_option("top_k", 40);
        let wire = Value::Object(options.to_wire());
        assert_eq!(wire["num_predict"], json!(42));
        assert_eq!(wire["top_k"], json!(40));
        assert_eq!(wire["temperature"], json!(0.8));
    }

    #[test]
    fn test_temperature_sent_exactly() {
        let wire = ChatOptions::default().with_temperature(0.2).to_wire();
        assert_eq!(serde_json::to_string(&wire["temperature"]).unwrap(), "0.2");
        let default = ChatOptions::default().to_wire();
        assert_eq!(serde_json::to_string(&default["temperature"]).unwrap(), "0.6");
    }

    #[test]
    fn test_chat_request_wire_shape() {
        let messages = vec![Message::system("be brief"), Message::user("Hello")];
        let request = ChatRequest {
            model: "llama3",
            messages: &messages,
            stream: true,
            options: ChatOptions::default().to_wire(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "llama3");
        assert_eq!(value["stream"], true);
        assert_eq!(
            value["messages"],
            json!([
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "Hello"}
            ])
        );
        assert_eq!(value["options"]["num_predict"], 1000);
    }

    #[test]
    fn test_stream_record_content() {
        let record: StreamRecord =
            serde_json::from_str(r#"{"message":{"role":"assistant","content":"Hi"},"done":false}"#)
                .unwrap();
        assert_eq!(record.content(), "Hi");
        assert_eq!(record.role(), Some(Role::Assistant));
        assert!(!record.done);

        let last: StreamRecord = serde_json::from_str(r#"{"done":true}"#).unwrap();
        assert_eq!(last.content(), "");
        assert!(last.done);
    }

    #[test]
    fn test_chat_response_keeps_extra_fields() {
        let body = r#"{"model":"m","message":{"role":"assistant","content":"ok"},"done":true,"eval_count":12}"#;
        let response: ChatResponse = serde_json::from_str(body).unwrap();
        let message = response.message.unwrap();
        assert_eq!(message.role, Some(Role::Assistant));
        assert_eq!(message.content, "ok");
        assert_eq!(response.extra["eval_count"], 12);
    }

    #[test]
    fn test_reply_message_role_is_lenient() {
        let bodies = [
            r#"{"message":{"content":"hi"},"done":true}"#,
            r#"{"message":{"role":null,"content":"hi"}}"#,
            r#"{"message":{"role":"tool","content":"hi"}}"#,
        ];
        for body in bodies {
            let response: ChatResponse = serde_json::from_str(body).unwrap();
            let message = response.message.unwrap();
            assert_eq!(message.role, None, "{}", body);
            assert_eq!(message.content, "hi");
        }

        let record: StreamRecord =
            serde_json::from_str(r#"{"message":{"role":"tool","content":"x"}}"#).unwrap();
        assert_eq!(record.role(), None);
        assert_eq!(record.content(), "x");
    }

    #[test]
    fn test_layer_percentage_follows_current_digest() {
        let progress = |completed, total| TransferProgress {
            completed,
            total,
            percentage: 100.0,
            ..Default::default()
        };
        assert_eq!(progress(50, 200).layer_percentage(), 25.0);
        assert_eq!(progress(0, 1000).layer_percentage(), 0.0);
        assert_eq!(progress(5000, 1000).layer_percentage(), 100.0);
        assert_eq!(progress(0, 0).layer_percentage(), 0.0);
    }

    #[test]
    fn test_model_info_helpers() {
        let info = ModelInfo {
            name: "llama3:8b".into(),
            digest: "365c0bd3c000a25d28ddbf732fe1c6add414de7275464c4e4d1c3b5fcb5d8ad1".into(),
            size: 4 * 1024 * 1024,
            modified_at: "2024-05-01T10:00:00Z".into(),
        };
        assert_eq!(info.short_digest(), "365c0bd3c000");
        assert!((info.size_mib() - 4.0).abs() < f64::EPSILON);
        assert_eq!(ModelInfo::default().short_digest(), "");
    }
}
