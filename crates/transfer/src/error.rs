//! Transfer error types.

use std::fmt;

use crate::storage::StorageError;

/// Coarse failure category reported in a [`TransferResult`](crate::TransferResult).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Declared size exceeds the hard maximum. Nothing was sent.
    ObjectTooLarge,
    /// The source object could not be opened.
    SourceUnavailable,
    /// A storage call or a mid-stream source read failed.
    NetworkFailure,
    /// An internal invariant did not hold (offset, size or hash mismatch).
    ProtocolViolation,
    /// The object name cannot be turned into a destination path.
    InvalidDestination,
    /// The transfer was cancelled externally.
    Cancelled,
}

impl FailureKind {
    /// Whether re-running the whole transfer may succeed.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::SourceUnavailable | Self::NetworkFailure)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ObjectTooLarge => "object too large",
            Self::SourceUnavailable => "source unavailable",
            Self::NetworkFailure => "network failure",
            Self::ProtocolViolation => "protocol violation",
            Self::InvalidDestination => "invalid destination",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while transferring an object.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("object too large: {size} bytes exceeds the {max} byte limit")]
    ObjectTooLarge { size: u64, max: u64 },

    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// The source answered, but will never serve this object.
    #[error("source refused: {0}")]
    SourceRefused(String),

    #[error("source read failed: {0}")]
    SourceRead(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid limits: {0}")]
    InvalidLimits(String),

    #[error("cancelled")]
    Cancelled,
}

impl TransferError {
    /// Maps the error onto the reported failure taxonomy.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::ObjectTooLarge { .. } => FailureKind::ObjectTooLarge,
            Self::SourceUnavailable(_) | Self::SourceRefused(_) => FailureKind::SourceUnavailable,
            Self::SourceRead(_) => FailureKind::NetworkFailure,
            Self::Storage(e) => e.kind(),
            Self::ProtocolViolation(_) | Self::InvalidLimits(_) => FailureKind::ProtocolViolation,
            Self::InvalidPath(_) => FailureKind::InvalidDestination,
            Self::Cancelled => FailureKind::Cancelled,
        }
    }

    /// Whether re-running the whole transfer may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::SourceRefused(_)) && self.kind().is_retryable()
    }
}
