//! oreo-client: Conversational client for Ollama-compatible inference servers
//!
//! This crate keeps an ordered chat history, sends buffered or streamed chat
//! requests, hides `<think>` reasoning blocks from streamed output, and runs
//! model downloads as cancellable background transfers.

pub mod config;
pub mod conversation;
pub mod decoder;
pub mod error;
pub mod reasoning;
pub mod session;
pub mod transfer;
pub mod transport;
pub mod types;

pub use config::{ClientConfig, ReasoningMarkers};
pub use conversation::Conversation;
pub use error::{Error, Result, TransportError};
pub use reasoning::{DeltaTracker, ReasoningFilter};
pub use session::{ChatReply, ChatSession, DeltaStream};
pub use transfer::{ProgressSink, TransferHandle, TransferManager, TransferOutcome};
pub use transport::{HttpTransport, ResponseBody, Transport};
pub use types::*;
