//! Source stream provider interface.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use tokio::io::AsyncRead;

use crate::TransferError;

/// Boxed future returned by [`SourceProvider::open_stream`].
pub type SourceFuture<'a> =
    Pin<Box<dyn Future<Output = Result<SourceStream, TransferError>> + Send + 'a>>;

/// The closed set of object kinds a message can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Document,
    Image,
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Image => "photo",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to an object held by the message-delivery service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub file_id: String,
    pub kind: MediaKind,
    pub file_name: Option<String>,
    /// Declared size in bytes; zero when the sender did not announce one.
    pub file_size: u64,
}

impl ObjectRef {
    /// Name used when the sender supplied none, e.g. `photo_AgADBAAD`.
    pub fn default_name(&self) -> String {
        format!("{}_{}", self.kind, self.file_id)
    }

    pub fn display_name(&self) -> String {
        match self.file_name {
            Some(ref name) if !name.is_empty() => name.clone(),
            _ => self.default_name(),
        }
    }
}

/// An opened, not yet consumed object stream.
pub struct SourceStream {
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub declared_size: Option<u64>,
    pub suggested_name: Option<String>,
}

impl fmt::Debug for SourceStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceStream")
            .field("declared_size", &self.declared_size)
            .field("suggested_name", &self.suggested_name)
            .finish_non_exhaustive()
    }
}

/// Opens readable streams for object references.
///
/// Implementations fail with [`TransferError::SourceUnavailable`] when the
/// reference is invalid or the remote service denies access.
pub trait SourceProvider: Send + Sync {
    fn open_stream<'a>(&'a self, object: &'a ObjectRef) -> SourceFuture<'a>;
}
