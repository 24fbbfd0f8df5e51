//! Chat session: ties transport, decoding, filtering and history together.

use std::pin::Pin;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_stream::stream;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio_stream::Stream;

use crate::{
    config::ClientConfig,
    conversation::{Conversation, PendingTurn},
    decoder::decode_records,
    error::{Error, Result},
    reasoning::{DeltaTracker, ReasoningFilter},
    transfer::TransferManager,
    transport::{HttpTransport, ResponseBody, Transport},
    types::{
        ChatOptions, ChatRequest, ChatResponse, Message, ModelInfo, ModelName, Role, TagsResponse,
    },
};

pub const CHAT_PATH: &str = "/api/chat";
pub const TAGS_PATH: &str = "/api/tags";
pub const DELETE_PATH: &str = "/api/delete";

/// Lazy sequence of visible text deltas
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Outcome of [`ChatSession::send`]
pub enum ChatReply {
    /// The full server object of a non-streamed request
    Buffered(ChatResponse),
    /// Visible text deltas of a streamed request.
    ///
    /// The assistant turn is recorded when the stream is driven to its end.
    /// Dropping it early leaves the user turn without a reply.
    Streamed(DeltaStream),
}

impl std::fmt::Debug for ChatReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatReply::Buffered(response) => f.debug_tuple("Buffered").field(response).finish(),
            ChatReply::Streamed(_) => f.write_str("Streamed(..)"),
        }
    }
}

/// Clears the in-flight flag when dropped
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::Busy)?;
        Ok(Self(Arc::clone(flag)))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One request/response exchange against the shared history.
///
/// If dropped before the server answered (e.g. the `send` future was
/// cancelled) the user turn is rolled back; after that it is kept.
struct Exchange {
    conversation: Arc<Mutex<Conversation>>,
    turn: Option<PendingTurn>,
    received: bool,
    _in_flight: InFlight,
}

impl Exchange {
    fn commit(&mut self, reply: Message) {
        if let Some(turn) = self.turn.take() {
            self.conversation.lock().commit(turn, reply);
        }
    }

    fn rollback(&mut self) {
        if let Some(turn) = self.turn.take() {
            self.conversation.lock().rollback(turn);
        }
    }

    fn abandon(&mut self) {
        if let Some(turn) = self.turn.take() {
            self.conversation.lock().abandon(turn);
        }
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        if self.received {
            self.abandon();
        } else {
            self.rollback();
        }
    }
}

/// A single conversation with one model on one server.
///
/// At most one `send` may be in flight; a second call fails with
/// [`Error::Busy`] until the first reply has been fully consumed or dropped.
pub struct ChatSession {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    conversation: Arc<Mutex<Conversation>>,
    filter: ReasoningFilter,
    in_flight: Arc<AtomicBool>,
}

impl ChatSession {
    /// Create a session talking HTTP to `config.base_url`
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Ok(Self::with_transport(config, transport))
    }

    /// Create a session over an arbitrary transport
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let conversation = Conversation::new(config.system_prompt());
        let filter = ReasoningFilter::from_markers(&config.reasoning);
        Self {
            config,
            transport,
            conversation: Arc::new(Mutex::new(conversation)),
            filter,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Model used for chat requests
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Switch the model used by subsequent requests; history is kept
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.config.model = model.into();
    }

    /// The configured system prompt (it may have been cleared from history)
    pub fn system_prompt(&self) -> Option<String> {
        self.config.system_prompt()
    }

    pub fn reasoning_filter(&self) -> &ReasoningFilter {
        &self.filter
    }

    /// Whether a request is currently in flight
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Copy of the history, optionally only the last `last_n` messages
    pub fn history(&self, last_n: Option<usize>) -> Vec<Message> {
        self.conversation.lock().snapshot(last_n)
    }

    /// Drop the whole history, system prompt included
    pub fn clear_history(&self) -> Result<()> {
        let _in_flight = InFlight::acquire(&self.in_flight)?;
        self.conversation.lock().clear();
        tracing::debug!("history cleared");
        Ok(())
    }

    /// Send a user prompt.
    ///
    /// The prompt is appended to history before the request is issued. If the
    /// request fails before the server answers, it is removed again and
    /// [`Error::ChatRequest`] is returned.
    pub async fn send(
        &self,
        prompt: &str,
        stream: bool,
        options: &ChatOptions,
    ) -> Result<ChatReply> {
        let in_flight = InFlight::acquire(&self.in_flight)?;

        let (turn, body) = {
            let mut conversation = self.conversation.lock();
            let turn = conversation.begin(prompt);
            let request = ChatRequest {
                model: &self.config.model,
                messages: conversation.messages(),
                stream,
                options: options.to_wire(),
            };
            match serde_json::to_value(&request) {
                Ok(body) => (turn, body),
                Err(e) => {
                    conversation.rollback(turn);
                    return Err(Error::InvalidConfig(format!("unserializable request: {}", e)));
                }
            }
        };

        let mut exchange = Exchange {
            conversation: Arc::clone(&self.conversation),
            turn: Some(turn),
            received: false,
            _in_flight: in_flight,
        };

        tracing::debug!(model = %self.config.model, stream, "sending chat request");
        let response = match self.transport.post(CHAT_PATH, &body, stream).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "chat request failed, rolling back user turn");
                exchange.rollback();
                return Err(Error::ChatRequest(e));
            }
        };

        if stream {
            exchange.received = true;
            Ok(ChatReply::Streamed(self.stream_reply(exchange, response)))
        } else {
            self.buffered_reply(exchange, response).await.map(ChatReply::Buffered)
        }
    }

    async fn buffered_reply(
        &self,
        mut exchange: Exchange,
        response: ResponseBody,
    ) -> Result<ChatResponse> {
        let text = match response.text().await {
            Ok(text) => text,
            Err(Error::Transport(e)) => {
                tracing::warn!(error = %e, "reading chat reply failed, rolling back user turn");
                exchange.rollback();
                return Err(Error::ChatRequest(e));
            }
            Err(e) => {
                exchange.received = true;
                exchange.abandon();
                return Err(e);
            }
        };
        exchange.received = true;

        let parsed: ChatResponse = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(e) => {
                exchange.abandon();
                return Err(Error::ResponseParse(e.to_string()));
            }
        };

        match &parsed.message {
            Some(message) => exchange.commit(Message {
                role: message.role.unwrap_or(Role::Assistant),
                content: self.filter.filter(&message.content),
            }),
            None => exchange.abandon(),
        }
        Ok(parsed)
    }

    fn stream_reply(&self, exchange: Exchange, response: ResponseBody) -> DeltaStream {
        let mut records = decode_records(response.into_lines());
        let mut tracker = DeltaTracker::new(self.filter.clone());
        let mut exchange = exchange;

        Box::pin(stream! {
            while let Some(record) = records.next().await {
                match record {
                    Ok(record) => {
                        if let Some(delta) = tracker.push(record.content()) {
                            yield Ok(delta);
                        }
                    }
                    Err(Error::Transport(e)) => {
                        tracing::warn!(error = %e, "chat stream interrupted, rolling back user turn");
                        exchange.rollback();
                        yield Err(Error::ChatRequest(e));
                        return;
                    }
                    Err(e) => {
                        exchange.abandon();
                        yield Err(e);
                        return;
                    }
                }
            }

            let tail = tracker.finish();
            exchange.commit(Message::assistant(tracker.visible()));
            if let Some(delta) = tail {
                yield Ok(delta);
            }
        })
    }

    /// Models installed on the server
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let body = self
            .transport
            .get(TAGS_PATH)
            .await
            .map_err(Error::ListModels)?;
        let text = body.text().await.map_err(|e| match e {
            Error::Transport(e) => Error::ListModels(e),
            other => other,
        })?;
        let tags: TagsResponse = serde_json::from_str(&text)?;
        Ok(tags.models.unwrap_or_default())
    }

    /// Delete an installed model. History is not touched.
    pub async fn delete_model(&self, name: &str) -> Result<()> {
        let body = serde_json::to_value(ModelName { name })?;
        self.transport
            .delete(DELETE_PATH, &body)
            .await
            .map_err(|source| Error::Delete {
                name: name.to_string(),
                source,
            })?;
        tracing::info!(model = name, "deleted model");
        Ok(())
    }

    /// Transfer manager sharing this session's transport
    pub fn transfers(&self) -> TransferManager {
        TransferManager::new(Arc::clone(&self.transport))
    }
}
