//! Streaming object transfer into a session-based storage service.
//!
//! An incoming object is classified by its declared size and then either
//! uploaded in one shot (small objects) or streamed through an upload
//! session in fixed-size chunks, so the whole object is never held in
//! memory.
//!
//! # Pipeline
//!
//! 1. **Classify** — [`classify`] picks `Inline`, `Chunked` or `TooLarge`
//! 2. **Upload** — [`InlineUploader`] or [`ChunkedUploader`]
//! 3. **Report** — every committed chunk emits a [`ProgressEvent`]
//! 4. **Result** — the [`TransferOrchestrator`] folds everything into a
//!    uniform [`TransferResult`]
//!
//! Storage and source backends plug in through [`StorageService`] and
//! [`SourceProvider`].

mod chunked;
mod classify;
mod error;
mod inline;
mod orchestrator;
mod progress;
mod retry;
mod source;
mod storage;
mod types;
mod validation;

#[cfg(test)]
mod fake;

use std::future::Future;

use tokio_util::sync::CancellationToken;

pub use chunked::{
    CONTENT_HASH_BLOCK_SIZE, ChunkReader, ChunkedUploader, ContentHasher, content_hash,
};
pub use classify::{SizeClass, TransferLimits, classify};
pub use error::{FailureKind, TransferError};
pub use inline::InlineUploader;
pub use orchestrator::TransferOrchestrator;
pub use progress::{ChannelProgress, NoProgress, ProgressSink, ProgressThrottle, SpeedCalculator};
pub use retry::RetryPolicy;
pub use source::{MediaKind, ObjectRef, SourceFuture, SourceProvider, SourceStream};
pub use storage::{
    CommitInfo, StorageError, StorageFuture, StorageService, StoredObject, WriteMode,
};
pub use types::{Chunk, ProgressEvent, Strategy, TransferRequest, TransferResult, UploadSession};
pub use validation::destination_path;

/// Largest object uploaded in a single request: 20 MiB.
pub const DEFAULT_SMALL_CEILING: u64 = 20 * 1024 * 1024;

/// Hard upper bound on a single transfer: 4 GiB.
pub const DEFAULT_HARD_MAX: u64 = 4 * 1024 * 1024 * 1024;

/// Default chunk size for session uploads: 8 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Awaits `fut` unless `cancel` fires first.
///
/// Cancellation wins ties so a cancelled transfer never starts another call.
pub(crate) async fn until_cancelled<F>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, TransferError>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransferError::Cancelled),
        out = fut => Ok(out),
    }
}
