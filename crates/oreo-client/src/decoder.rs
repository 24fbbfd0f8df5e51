//! Newline-delimited JSON decoding

use std::pin::Pin;

use async_stream::stream;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio_stream::Stream;

use crate::{
    error::{Error, Result},
    transport::LineStream,
    types::StreamRecord,
};

/// A stream of decoded chat records
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<StreamRecord>> + Send>>;

/// Parse each line as one JSON object of type `T`.
///
/// The first transport error, undecodable line or unparseable record is
/// yielded as an error and ends the stream; nothing is skipped.
pub fn decode_lines<T>(mut lines: LineStream) -> impl Stream<Item = Result<T>> + Send
where
    T: DeserializeOwned + Send + 'static,
{
    stream! {
        let mut count = 0usize;
        while let Some(line) = lines.next().await {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::debug!(records = count, error = %e, "stream interrupted");
                    yield Err(e);
                    return;
                }
            };

            match serde_json::from_str::<T>(&line) {
                Ok(record) => {
                    count += 1;
                    yield Ok(record);
                }
                Err(e) => {
                    tracing::debug!(records = count, line = %line, "malformed stream record");
                    yield Err(Error::ResponseParse(format!("{} in line: {}", e, line)));
                    return;
                }
            }
        }
        tracing::debug!(records = count, "stream finished");
    }
}

/// Decode a streamed chat reply into records.
///
/// A record carrying an `error` field ends the stream with `Error::Server`.
pub fn decode_records(lines: LineStream) -> RecordStream {
    let mut records = Box::pin(decode_lines::<StreamRecord>(lines));
    Box::pin(stream! {
        while let Some(record) = records.next().await {
            match record {
                Ok(StreamRecord { error: Some(message), .. }) => {
                    yield Err(Error::Server(message));
                    return;
                }
                Ok(record) => yield Ok(record),
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
    })
}
