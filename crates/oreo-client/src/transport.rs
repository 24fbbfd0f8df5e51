//! HTTP transport for the inference server
//!
//! [`Transport`] is the seam between the chat/transfer logic and the network.
//! [`HttpTransport`] implements it with `reqwest`; tests swap in an in-memory
//! implementation.

use std::pin::Pin;

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio_stream::Stream;

use crate::{
    config::ClientConfig,
    error::{Error, Result, TransportError},
};

/// Lazy, single-pass sequence of non-empty response lines.
///
/// Network failures arrive as `Error::Transport`, lines that are not valid
/// UTF-8 as `Error::ResponseParse`.
pub type LineStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A successful (2xx) response
pub enum ResponseBody {
    /// Fully read body, not yet decoded
    Buffered(Vec<u8>),
    /// Body still being read, one line at a time
    Lines(LineStream),
}

impl ResponseBody {
    /// Read the whole body as UTF-8 text
    pub async fn text(self) -> Result<String> {
        match self {
            ResponseBody::Buffered(bytes) => String::from_utf8(bytes)
                .map_err(|e| Error::ResponseParse(format!("response body is not UTF-8: {}", e))),
            ResponseBody::Lines(mut lines) => {
                let mut text = String::new();
                while let Some(line) = lines.next().await {
                    text.push_str(&line?);
                    text.push('\n');
                }
                Ok(text)
            }
        }
    }

    /// View the body as a line sequence, splitting a buffered body if needed
    pub fn into_lines(self) -> LineStream {
        match self {
            ResponseBody::Lines(lines) => lines,
            ResponseBody::Buffered(bytes) => {
                let mut buffer = LineBuffer::default();
                let mut lines = buffer.push(&bytes);
                lines.extend(buffer.finish());
                // Nothing after a bad line is delivered
                if let Some(bad) = lines.iter().position(|l| l.is_err()) {
                    lines.truncate(bad + 1);
                }
                Box::pin(futures::stream::iter(lines))
            }
        }
    }
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Buffered(bytes) => write!(f, "Buffered({} bytes)", bytes.len()),
            ResponseBody::Lines(_) => f.write_str("Lines(..)"),
        }
    }
}

/// Request/response access to the inference server
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST a JSON body. With `stream` set the body is returned as lines.
    async fn post(
        &self,
        path: &str,
        body: &Value,
        stream: bool,
    ) -> std::result::Result<ResponseBody, TransportError>;

    /// GET a buffered body
    async fn get(&self, path: &str) -> std::result::Result<ResponseBody, TransportError>;

    /// DELETE with a JSON body
    async fn delete(
        &self,
        path: &str,
        body: &Value,
    ) -> std::result::Result<ResponseBody, TransportError>;
}

/// `reqwest`-backed transport with separate connect and read timeouts
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport from client configuration
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        stream: bool,
    ) -> std::result::Result<ResponseBody, TransportError> {
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(status = %status, body = %body, "server rejected request");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        if stream {
            Ok(ResponseBody::Lines(Box::pin(split_lines(
                response.bytes_stream(),
            ))))
        } else {
            Ok(ResponseBody::Buffered(response.bytes().await?.to_vec()))
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(
        &self,
        path: &str,
        body: &Value,
        stream: bool,
    ) -> std::result::Result<ResponseBody, TransportError> {
        tracing::debug!(path, stream, "POST");
        let request = self.client.post(self.url(path)).json(body);
        self.execute(request, stream).await
    }

    async fn get(&self, path: &str) -> std::result::Result<ResponseBody, TransportError> {
        tracing::debug!(path, "GET");
        let request = self.client.get(self.url(path));
        self.execute(request, false).await
    }

    async fn delete(
        &self,
        path: &str,
        body: &Value,
    ) -> std::result::Result<ResponseBody, TransportError> {
        tracing::debug!(path, "DELETE");
        let request = self.client.delete(self.url(path)).json(body);
        self.execute(request, false).await
    }
}

/// Turn a stream of byte chunks into a stream of non-empty lines.
///
/// A transport error or a line that is not valid UTF-8 ends the stream after
/// being yielded once.
pub(crate) fn split_lines<S, B, E>(
    chunks: S,
) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<TransportError> + Send + 'static,
{
    stream! {
        let mut chunks = Box::pin(chunks);
        let mut buffer = LineBuffer::default();

        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(bytes) => {
                    for line in buffer.push(bytes.as_ref()) {
                        let failed = line.is_err();
                        yield line;
                        if failed {
                            return;
                        }
                    }
                }
                Err(e) => {
                    let err: TransportError = e.into();
                    yield Err(Error::Transport(err));
                    return;
                }
            }
        }

        if let Some(line) = buffer.finish() {
            yield line;
        }
    }
}

/// Incremental newline splitter.
///
/// Bytes are buffered until a full line is available, so multi-byte UTF-8
/// sequences split across chunks decode correctly. A completed line that is
/// not valid UTF-8 comes back as `Error::ResponseParse`.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Feed a chunk and collect every completed, non-blank line
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<String>> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(line) = decode_line(&raw) {
                lines.push(line);
            }
        }
        lines
    }

    /// Flush a trailing line that had no terminating newline
    pub fn finish(&mut self) -> Option<Result<String>> {
        let raw = std::mem::take(&mut self.pending);
        decode_line(&raw)
    }
}

fn decode_line(raw: &[u8]) -> Option<Result<String>> {
    let text = match std::str::from_utf8(raw) {
        Ok(text) => text,
        Err(e) => {
            return Some(Err(Error::ResponseParse(format!(
                "stream line is not UTF-8 ({}): {}",
                e,
                String::from_utf8_lossy(raw).trim()
            ))));
        }
    };
    let line = text.trim();
    if line.is_empty() {
        None
    } else {
        Some(Ok(line.to_string()))
    }
}
