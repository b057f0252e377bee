//! Destination storage service interface.
//!
//! `StorageService` is implemented by the storage backend (the Dropbox
//! client in production, an in-memory fake in tests). Keeping the upload
//! primitives behind a trait keeps the transfer logic testable without a
//! network.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::TransferError;
use crate::error::FailureKind;

/// Boxed future returned by [`StorageService`] calls.
pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// Errors reported by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("network failure: {0}")]
    Network(String),

    #[error("rejected by storage service: {0}")]
    Rejected(String),

    /// The service acknowledged a different number of bytes than the client sent.
    #[error("incorrect offset: service expects offset {expected}")]
    IncorrectOffset { expected: u64 },
}

impl StorageError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Network(_) | Self::Rejected(_) => FailureKind::NetworkFailure,
            Self::IncorrectOffset { .. } => FailureKind::ProtocolViolation,
        }
    }
}

/// What to do when the destination path already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Keep the existing object; the commit fails with a conflict.
    Add,
    /// Replace the existing object. Last commit wins.
    #[default]
    Overwrite,
}

/// Where and how the finished object is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub path: String,
    pub mode: WriteMode,
    /// Content hash of the complete object, when known at commit time.
    pub content_hash: Option<String>,
}

impl CommitInfo {
    pub fn new(path: impl Into<String>, mode: WriteMode) -> Self {
        Self {
            path: path.into(),
            mode,
            content_hash: None,
        }
    }

    pub fn with_content_hash(mut self, hash: String) -> Self {
        self.content_hash = Some(hash);
        self
    }
}

/// Metadata of a committed object as reported by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredObject {
    pub path: String,
    pub size: Option<u64>,
    pub content_hash: Option<String>,
}

impl StoredObject {
    /// Checks the service-reported size and hash against what was sent.
    ///
    /// Missing fields are not an error; the service is not required to
    /// report them.
    pub fn verify(&self, sent_bytes: u64, sent_hash: &str) -> Result<(), TransferError> {
        if let Some(size) = self.size
            && size != sent_bytes
        {
            error!(path = %self.path, reported = size, sent = sent_bytes, "stored size mismatch");
            return Err(TransferError::ProtocolViolation(format!(
                "service stored {size} bytes but {sent_bytes} were sent"
            )));
        }
        if let Some(ref hash) = self.content_hash
            && hash != sent_hash
        {
            error!(path = %self.path, reported = %hash, sent = %sent_hash, "content hash mismatch");
            return Err(TransferError::ProtocolViolation(
                "stored content hash does not match uploaded data".into(),
            ));
        }
        Ok(())
    }
}

/// Upload primitives of the destination service.
///
/// Session calls are strictly ordered by offset: the caller never issues an
/// append before the previous one has returned.
pub trait StorageService: Send + Sync {
    /// Opens an upload session with an empty initial payload.
    fn begin_session(&self) -> StorageFuture<'_, String>;

    /// Appends `data` at `offset` within the session.
    fn append_to_session<'a>(
        &'a self,
        session_id: &'a str,
        offset: u64,
        data: Vec<u8>,
    ) -> StorageFuture<'a, ()>;

    /// Appends the final `data` at `offset` and commits the object.
    fn finish_session<'a>(
        &'a self,
        session_id: &'a str,
        offset: u64,
        data: Vec<u8>,
        commit: &'a CommitInfo,
    ) -> StorageFuture<'a, StoredObject>;

    /// Uploads a complete object in one all-or-nothing request.
    fn put_object<'a>(
        &'a self,
        data: Vec<u8>,
        commit: &'a CommitInfo,
    ) -> StorageFuture<'a, StoredObject>;
}
