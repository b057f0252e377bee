use std::fmt;

use tokio::io::AsyncRead;

use crate::error::{FailureKind, TransferError};
use crate::source::{MediaKind, ObjectRef, SourceStream};
use crate::storage::StoredObject;

/// A chunk of object data pulled from the source stream.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Zero-based position of this chunk in the transfer.
    pub index: u64,
    /// Byte offset of the first byte within the object.
    pub offset: u64,
    /// Raw chunk data. Empty only for a final chunk at end of stream.
    pub data: Vec<u8>,
    /// Whether this chunk ends the object and must be committed.
    pub is_final: bool,
}

impl Chunk {
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Upload strategy that ran for a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Inline,
    Chunked,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline => f.write_str("inline"),
            Self::Chunked => f.write_str("chunked"),
        }
    }
}

/// One object to transfer, owned by a single transfer.
pub struct TransferRequest {
    /// Lazy, sequential byte stream of the object.
    pub source: Box<dyn AsyncRead + Send + Unpin>,
    /// Size announced by the source. Advisory: bytes actually read win.
    pub declared_size: u64,
    pub object_name: String,
    pub kind: MediaKind,
}

impl TransferRequest {
    pub fn new(
        source: Box<dyn AsyncRead + Send + Unpin>,
        declared_size: u64,
        object_name: impl Into<String>,
        kind: MediaKind,
    ) -> Self {
        Self {
            source,
            declared_size,
            object_name: object_name.into(),
            kind,
        }
    }

    /// Assembles a request from an opened source stream.
    ///
    /// The size and name carried by the incoming message take precedence
    /// over what the stream reports.
    pub fn from_source(object: &ObjectRef, stream: SourceStream) -> Self {
        let declared_size = if object.file_size > 0 {
            object.file_size
        } else {
            stream.declared_size.unwrap_or(0)
        };
        let object_name = match (&object.file_name, stream.suggested_name) {
            (Some(name), _) if !name.is_empty() => name.clone(),
            (_, Some(name)) if !name.is_empty() => name,
            _ => object.default_name(),
        };
        Self {
            source: stream.reader,
            declared_size,
            object_name,
            kind: object.kind,
        }
    }
}

impl fmt::Debug for TransferRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferRequest")
            .field("declared_size", &self.declared_size)
            .field("object_name", &self.object_name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// An open upload session on the storage service.
///
/// `cursor_offset` only moves after the service acknowledged a chunk, so it
/// always equals the number of bytes the service holds for this session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    id: String,
    cursor_offset: u64,
    chunks_acknowledged: u64,
}

impl UploadSession {
    pub fn new(id: String) -> Self {
        Self {
            id,
            cursor_offset: 0,
            chunks_acknowledged: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cursor_offset(&self) -> u64 {
        self.cursor_offset
    }

    pub fn chunks_acknowledged(&self) -> u64 {
        self.chunks_acknowledged
    }

    /// Records `len` bytes acknowledged by the service.
    pub(crate) fn acknowledge(&mut self, len: u64) {
        self.cursor_offset += len;
        self.chunks_acknowledged += 1;
    }
}

/// Progress notification, one per acknowledged chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    /// One-based number of the chunk just acknowledged.
    pub chunk_index: u64,
    /// Bytes acknowledged by the service so far.
    pub bytes_transferred: u64,
    /// Declared object size; zero when unknown.
    pub total_bytes: u64,
}

impl ProgressEvent {
    /// Completion percentage, capped at 100. `None` when the total is unknown.
    pub fn percent(&self) -> Option<f64> {
        if self.total_bytes == 0 {
            return None;
        }
        let pct = self.bytes_transferred as f64 / self.total_bytes as f64 * 100.0;
        Some(pct.min(100.0))
    }
}

/// Outcome of one transfer, identical in shape for every strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    pub succeeded: bool,
    /// Bytes acknowledged by the storage service.
    pub bytes_transferred: u64,
    /// `None` when the object was refused before a strategy ran.
    pub strategy_used: Option<Strategy>,
    pub failure_reason: Option<FailureKind>,
    /// Human-readable detail of the failure.
    pub error: Option<String>,
    /// Metadata of the committed object on success.
    pub stored: Option<StoredObject>,
    /// Whole-transfer attempts made, including the final one.
    pub attempts: u32,
    /// Whether re-running the transfer may help.
    pub retryable: bool,
}

impl TransferResult {
    pub fn success(strategy: Strategy, bytes_transferred: u64, stored: StoredObject) -> Self {
        Self {
            succeeded: true,
            bytes_transferred,
            strategy_used: Some(strategy),
            failure_reason: None,
            error: None,
            stored: Some(stored),
            attempts: 1,
            retryable: false,
        }
    }

    pub fn failure(
        strategy: Option<Strategy>,
        bytes_transferred: u64,
        error: &TransferError,
    ) -> Self {
        Self {
            succeeded: false,
            bytes_transferred,
            strategy_used: strategy,
            failure_reason: Some(error.kind()),
            error: Some(error.to_string()),
            stored: None,
            attempts: 1,
            retryable: error.is_retryable(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}
