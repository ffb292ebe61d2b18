//! Incremental progress for long extraction and embedding passes.

use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// `done` of `total` files have been read; `file` is the one just finished.
    Extracting {
        done: usize,
        total: usize,
        file: String,
    },
    /// `done` of `total` corpus units have vectors.
    Embedding { done: usize, total: usize },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Logs events through `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressReporter for TracingProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Extracting { done, total, file } => {
                info!(done, total, file = %file, "extracting");
            }
            ProgressEvent::Embedding { done, total } => {
                info!(done, total, "embedding");
            }
        }
    }
}
