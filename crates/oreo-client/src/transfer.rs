//! Background model transfers (`POST /api/pull`)
//!
//! Each transfer runs on its own Tokio task and reports through a
//! [`ProgressSink`]. The returned [`TransferHandle`] can be awaited for the
//! outcome or cancelled, which drops the in-flight request.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    decoder::decode_lines,
    transport::Transport,
    types::{ModelName, PullRecord, TransferProgress},
};

pub const PULL_PATH: &str = "/api/pull";

/// Status of the synthetic record sent after a successful transfer
pub const STATUS_COMPLETE: &str = "complete";

/// Receives progress records of one transfer, in order
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, progress: TransferProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(TransferProgress) + Send + Sync,
{
    fn on_progress(&self, progress: TransferProgress) {
        self(progress)
    }
}

impl ProgressSink for mpsc::UnboundedSender<TransferProgress> {
    fn on_progress(&self, progress: TransferProgress) {
        // A closed receiver means nobody is listening any more
        let _ = self.send(progress);
    }
}

/// How a transfer ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

/// Starts transfers against one server
#[derive(Clone)]
pub struct TransferManager {
    transport: Arc<dyn Transport>,
}

impl TransferManager {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Start pulling `name` in the background and return immediately.
    ///
    /// Must be called from within a Tokio runtime. Dropping the handle
    /// detaches the transfer; it keeps running until it finishes.
    pub fn start(&self, name: impl Into<String>, sink: impl ProgressSink + 'static) -> TransferHandle {
        let model = name.into();
        let cancel = CancellationToken::new();
        tracing::debug!(model = %model, "starting transfer");

        let task = tokio::spawn(run_transfer(
            Arc::clone(&self.transport),
            model.clone(),
            sink,
            cancel.clone(),
        ));

        TransferHandle {
            model,
            cancel,
            task,
        }
    }
}

/// Handle to a running transfer
#[derive(Debug)]
pub struct TransferHandle {
    model: String,
    cancel: CancellationToken,
    task: JoinHandle<TransferOutcome>,
}

impl TransferHandle {
    /// Model being transferred
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Stop the transfer. The request is dropped and no further progress is
    /// reported; the server may still finish the download on its own.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the transfer to end
    pub async fn join(self) -> TransferOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => TransferOutcome::Cancelled,
            Err(e) => TransferOutcome::Failed(format!("transfer task failed: {}", e)),
        }
    }
}

async fn run_transfer(
    transport: Arc<dyn Transport>,
    model: String,
    sink: impl ProgressSink,
    cancel: CancellationToken,
) -> TransferOutcome {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::debug!(model = %model, "transfer cancelled");
            TransferOutcome::Cancelled
        }
        outcome = pull(transport.as_ref(), &model, &sink) => outcome,
    }
}

async fn pull(transport: &dyn Transport, model: &str, sink: &impl ProgressSink) -> TransferOutcome {
    let body = match serde_json::to_value(ModelName { name: model }) {
        Ok(body) => body,
        Err(e) => return fail(sink, model, e.to_string()),
    };

    let response = match transport.post(PULL_PATH, &body, true).await {
        Ok(response) => response,
        Err(e) => return fail(sink, model, e.to_string()),
    };

    let mut records = Box::pin(decode_lines::<PullRecord>(response.into_lines()));
    let mut progress = ProgressTracker::default();
    while let Some(record) = records.next().await {
        match record {
            Ok(PullRecord {
                error: Some(message),
                ..
            }) => return fail(sink, model, message),
            Ok(record) => sink.on_progress(progress.update(model, record)),
            Err(e) => return fail(sink, model, e.to_string()),
        }
    }

    tracing::info!(model, "transfer complete");
    sink.on_progress(progress.complete(model));
    TransferOutcome::Completed
}

fn fail(sink: &impl ProgressSink, model: &str, message: String) -> TransferOutcome {
    tracing::warn!(model, error = %message, "transfer failed");
    sink.on_progress(TransferProgress {
        model: model.to_string(),
        error: Some(message.clone()),
        ..Default::default()
    });
    TransferOutcome::Failed(message)
}

/// Turns raw pull records into progress with a non-decreasing percentage.
///
/// The server reports each layer separately, so the per-record ratio drops
/// back to zero when the next layer starts; the reported value never does.
/// It is a lower bound on overall progress. Per-layer progress is
/// `TransferProgress::layer_percentage`.
#[derive(Debug, Default)]
struct ProgressTracker {
    percentage: f64,
    completed: u64,
    total: u64,
}

impl ProgressTracker {
    fn update(&mut self, model: &str, record: PullRecord) -> TransferProgress {
        self.completed = record.completed;
        self.total = record.total;

        let mut progress = TransferProgress {
            model: model.to_string(),
            status: record.status,
            digest: record.digest,
            completed: record.completed,
            total: record.total,
            percentage: 0.0,
            error: None,
        };
        self.percentage = self.percentage.max(progress.layer_percentage());
        progress.percentage = self.percentage;
        progress
    }

    fn complete(&mut self, model: &str) -> TransferProgress {
        self.percentage = 100.0;
        TransferProgress {
            model: model.to_string(),
            status: STATUS_COMPLETE.to_string(),
            digest: None,
            completed: self.completed,
            total: self.total,
            percentage: self.percentage,
            error: None,
        }
    }
}
