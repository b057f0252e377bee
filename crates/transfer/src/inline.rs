use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::chunked::content_hash;
use crate::storage::{CommitInfo, StorageService, StoredObject};
use crate::{TransferError, until_cancelled};

/// Uploads small objects with a single put.
pub struct InlineUploader<'a> {
    storage: &'a dyn StorageService,
    ceiling: u64,
    cancel: CancellationToken,
    uploaded: u64,
}

impl<'a> InlineUploader<'a> {
    /// `ceiling` bounds the in-memory buffer.
    pub fn new(storage: &'a dyn StorageService, ceiling: u64) -> Self {
        Self {
            storage,
            ceiling,
            cancel: CancellationToken::new(),
            uploaded: 0,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Bytes committed by the last successful upload.
    pub fn uploaded_bytes(&self) -> u64 {
        self.uploaded
    }

    /// Reads `source` to completion and puts it at `commit.path`.
    ///
    /// A source that produces more than the ceiling is refused instead of
    /// buffering it.
    pub async fn upload<R>(
        &mut self,
        source: R,
        declared_size: u64,
        commit: CommitInfo,
    ) -> Result<StoredObject, TransferError>
    where
        R: AsyncRead + Unpin,
    {
        let capacity = declared_size.min(self.ceiling) as usize;
        let mut buf = Vec::with_capacity(capacity);
        let mut limited = source.take(self.ceiling.saturating_add(1));
        until_cancelled(&self.cancel, limited.read_to_end(&mut buf)).await??;

        let len = buf.len() as u64;
        if len > self.ceiling {
            return Err(TransferError::ProtocolViolation(format!(
                "source produced more than the {} byte inline ceiling",
                self.ceiling
            )));
        }

        let hash = content_hash(&buf);
        let commit = commit.with_content_hash(hash.clone());
        let stored = until_cancelled(&self.cancel, self.storage.put_object(buf, &commit)).await??;
        stored.verify(len, &hash)?;

        self.uploaded = len;
        info!(path = %stored.path, bytes = len, "inline upload complete");
        Ok(stored)
    }
}
