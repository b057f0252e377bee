//! Transfer orchestrator.
//!
//! Classifies each object by declared size, dispatches it to the inline or
//! chunked uploader and folds the outcome into a [`TransferResult`]. Every
//! failure is returned as data; nothing escapes as an error or a panic.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::chunked::ChunkedUploader;
use crate::classify::{SizeClass, TransferLimits};
use crate::error::{FailureKind, TransferError};
use crate::inline::InlineUploader;
use crate::progress::ProgressSink;
use crate::source::{ObjectRef, SourceProvider};
use crate::storage::{CommitInfo, StorageService, WriteMode};
use crate::types::{Strategy, TransferRequest, TransferResult};
use crate::validation::destination_path;
use crate::until_cancelled;

/// Runs transfers against one storage service.
///
/// Cheap to share: the storage handle is read-only and every transfer keeps
/// its own session state.
#[derive(Clone)]
pub struct TransferOrchestrator {
    storage: Arc<dyn StorageService>,
    limits: TransferLimits,
    destination_root: String,
    write_mode: WriteMode,
}

impl TransferOrchestrator {
    /// Creates an orchestrator writing to the service root with overwrite.
    pub fn new(storage: Arc<dyn StorageService>, limits: TransferLimits) -> Self {
        Self {
            storage,
            limits,
            destination_root: "/".into(),
            write_mode: WriteMode::Overwrite,
        }
    }

    pub fn with_destination_root(mut self, root: impl Into<String>) -> Self {
        self.destination_root = root.into();
        self
    }

    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    pub fn limits(&self) -> &TransferLimits {
        &self.limits
    }

    pub fn destination_root(&self) -> &str {
        &self.destination_root
    }

    pub fn write_mode(&self) -> WriteMode {
        self.write_mode
    }

    /// Transfers `request` to `destination`.
    pub async fn transfer(
        &self,
        request: TransferRequest,
        destination: CommitInfo,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> TransferResult {
        let declared = request.declared_size;
        let class = self.limits.classify(declared);
        info!(
            name = %request.object_name,
            kind = %request.kind,
            declared,
            path = %destination.path,
            ?class,
            "transfer starting"
        );

        let result = match class {
            SizeClass::TooLarge => {
                let err = TransferError::ObjectTooLarge {
                    size: declared,
                    max: self.limits.hard_max,
                };
                TransferResult::failure(None, 0, &err)
            }
            SizeClass::Inline => {
                let mut uploader =
                    InlineUploader::new(self.storage.as_ref(), self.limits.small_ceiling)
                        .with_cancel(cancel.clone());
                match uploader.upload(request.source, declared, destination).await {
                    Ok(stored) => {
                        TransferResult::success(Strategy::Inline, uploader.uploaded_bytes(), stored)
                    }
                    Err(e) => TransferResult::failure(Some(Strategy::Inline), 0, &e),
                }
            }
            SizeClass::Chunked => {
                let mut uploader =
                    ChunkedUploader::new(self.storage.as_ref(), self.limits.chunk_size)
                        .with_progress(progress)
                        .with_cancel(cancel.clone());
                match uploader.upload(request.source, declared, destination).await {
                    Ok(stored) => TransferResult::success(
                        Strategy::Chunked,
                        uploader.acknowledged_bytes(),
                        stored,
                    ),
                    Err(e) => TransferResult::failure(
                        Some(Strategy::Chunked),
                        uploader.acknowledged_bytes(),
                        &e,
                    ),
                }
            }
        };

        log_result(&request.object_name, &result);
        result
    }

    /// Opens `object` through `provider` and transfers it under the
    /// configured destination root.
    ///
    /// Objects declared over the hard maximum are refused before the source
    /// is opened.
    pub async fn transfer_object(
        &self,
        provider: &dyn SourceProvider,
        object: &ObjectRef,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> TransferResult {
        let name = object.display_name();

        if self.limits.classify(object.file_size) == SizeClass::TooLarge {
            let err = TransferError::ObjectTooLarge {
                size: object.file_size,
                max: self.limits.hard_max,
            };
            let result = TransferResult::failure(None, 0, &err);
            log_result(&name, &result);
            return result;
        }

        let stream = match until_cancelled(cancel, provider.open_stream(object)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) | Err(e) => {
                let result = TransferResult::failure(None, 0, &e);
                log_result(&name, &result);
                return result;
            }
        };

        let request = TransferRequest::from_source(object, stream);
        let path = match destination_path(&self.destination_root, &request.object_name) {
            Ok(path) => path,
            Err(e) => {
                let result = TransferResult::failure(None, 0, &e);
                log_result(&request.object_name, &result);
                return result;
            }
        };

        self.transfer(request, CommitInfo::new(path, self.write_mode), progress, cancel)
            .await
    }
}

fn log_result(name: &str, result: &TransferResult) {
    let strategy = result.strategy_used.map(|s| s.to_string());
    match result.failure_reason {
        None => info!(
            object = name,
            strategy = strategy.as_deref().unwrap_or("none"),
            bytes = result.bytes_transferred,
            "transfer succeeded"
        ),
        Some(FailureKind::ProtocolViolation) => error!(
            object = name,
            strategy = strategy.as_deref().unwrap_or("none"),
            bytes = result.bytes_transferred,
            error = result.error.as_deref().unwrap_or_default(),
            "transfer aborted on protocol violation"
        ),
        Some(kind) => warn!(
            object = name,
            strategy = strategy.as_deref().unwrap_or("none"),
            bytes = result.bytes_transferred,
            reason = %kind,
            error = result.error.as_deref().unwrap_or_default(),
            "transfer failed"
        ),
    }
}
