//! Error types for oreo-client

use thiserror::Error;

/// Result type alias using oreo-client Error
pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised by the HTTP transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The server did not accept the connection in time
    #[error("connection timed out: {0}")]
    ConnectTimeout(String),

    /// The server accepted the request but stopped sending data
    #[error("read timed out: {0}")]
    ReadTimeout(String),

    /// The server could not be reached at all
    #[error("connection failed: {0}")]
    Connection(String),

    /// The server answered with a non-2xx status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Any other request failure
    #[error("request failed: {0}")]
    Request(String),
}

impl TransportError {
    /// Short human-readable category for this failure
    pub fn summary(&self) -> &'static str {
        match self {
            TransportError::ConnectTimeout(_) | TransportError::Connection(_) => {
                "cannot reach server"
            }
            TransportError::ReadTimeout(_) => "server too slow",
            TransportError::Status { .. } => "request rejected",
            TransportError::Request(_) => "request failed",
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        // A connect timeout reports both flags, so check it first.
        if err.is_connect() && err.is_timeout() {
            TransportError::ConnectTimeout(err.to_string())
        } else if err.is_timeout() {
            TransportError::ReadTimeout(err.to_string())
        } else if err.is_connect() {
            TransportError::Connection(err.to_string())
        } else if let Some(status) = err.status() {
            TransportError::Status {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// Errors that can occur when talking to the inference server
#[derive(Error, Debug)]
pub enum Error {
    /// Transport failure outside of a chat call
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A chat call failed before a response was obtained; history was rolled back
    #[error("chat request failed ({summary}): {0}", summary = .0.summary())]
    ChatRequest(#[source] TransportError),

    /// A body or stream record could not be decoded
    #[error("failed to parse response: {0}")]
    ResponseParse(String),

    /// The server reported an error inside an otherwise valid response
    #[error("server error: {0}")]
    Server(String),

    /// Listing installed models failed
    #[error("failed to list models: {0}")]
    ListModels(#[source] TransportError),

    /// Deleting a model failed
    #[error("failed to delete model '{name}': {source}")]
    Delete {
        name: String,
        #[source]
        source: TransportError,
    },

    /// Another call is already in flight on this session
    #[error("a chat request is already in progress")]
    Busy,

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Short human-readable category, distinguishing unreachable servers from
    /// slow ones, bad data and rejected requests.
    pub fn summary(&self) -> &'static str {
        match self {
            Error::Transport(e) | Error::ChatRequest(e) | Error::ListModels(e) => e.summary(),
            Error::Delete { source, .. } => source.summary(),
            Error::ResponseParse(_) => "bad response data",
            Error::Server(_) => "request rejected",
            Error::Busy => "client busy",
            Error::InvalidConfig(_) => "invalid configuration",
        }
    }

    /// Whether the speculative user turn was removed from history
    pub fn is_rolled_back(&self) -> bool {
        matches!(self, Error::ChatRequest(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ResponseParse(err.to_string())
    }
}
