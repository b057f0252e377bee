use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::progress::{NoProgress, ProgressSink};
use crate::storage::{CommitInfo, StorageService, StoredObject};
use crate::types::{Chunk, ProgressEvent, UploadSession};
use crate::{DEFAULT_CHUNK_SIZE, TransferError, until_cancelled};

/// Block size of the storage service's content hash: 4 MiB.
pub const CONTENT_HASH_BLOCK_SIZE: usize = 4 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Content hash
// ---------------------------------------------------------------------------

/// Incremental block content hash.
///
/// The object is split into 4 MiB blocks, each block is hashed with
/// SHA-256, and the concatenated block digests are hashed again. The result
/// is hex-encoded.
pub struct ContentHasher {
    block: Sha256,
    block_len: usize,
    overall: Sha256,
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentHasher {
    pub fn new() -> Self {
        Self {
            block: Sha256::new(),
            block_len: 0,
            overall: Sha256::new(),
        }
    }

    pub fn update(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let take = (CONTENT_HASH_BLOCK_SIZE - self.block_len).min(data.len());
            self.block.update(&data[..take]);
            self.block_len += take;
            data = &data[take..];
            if self.block_len == CONTENT_HASH_BLOCK_SIZE {
                self.overall.update(self.block.finalize_reset());
                self.block_len = 0;
            }
        }
    }

    pub fn finish(mut self) -> String {
        if self.block_len > 0 {
            self.overall.update(self.block.finalize());
        }
        hex::encode(self.overall.finalize())
    }
}

/// Computes the content hash of `data` in one go.
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = ContentHasher::new();
    hasher.update(data);
    hasher.finish()
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Pulls fixed-size chunks from a sequential stream and decides finality.
///
/// A chunk is filled until it holds `chunk_size` bytes or the stream ends;
/// short reads never end a chunk early. A full chunk that reaches the
/// declared size is only final if a probe read confirms end of stream.
/// Probed bytes are carried into the next chunk.
pub struct ChunkReader<R> {
    reader: R,
    chunk_size: usize,
    declared_size: u64,
    offset: u64,
    next_index: u64,
    carry: Vec<u8>,
    eof: bool,
    done: bool,
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    /// Wraps `reader`.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] (8 MiB) is used.
    pub fn new(reader: R, chunk_size: usize, declared_size: u64) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Self {
            reader,
            chunk_size,
            declared_size,
            offset: 0,
            next_index: 0,
            carry: Vec::new(),
            eof: false,
            done: false,
        }
    }

    /// Reads the next chunk. Returns `None` once the final chunk was handed out.
    pub async fn next_chunk(&mut self) -> std::io::Result<Option<Chunk>> {
        if self.done {
            return Ok(None);
        }

        let mut data = std::mem::take(&mut self.carry);
        if !self.eof {
            self.fill(&mut data).await?;
        }

        let mut is_final = self.eof;
        if !is_final && self.offset + data.len() as u64 >= self.declared_size {
            is_final = self.probe_end().await?;
        }

        let chunk = Chunk {
            index: self.next_index,
            offset: self.offset,
            data,
            is_final,
        };
        self.offset += chunk.len();
        self.next_index += 1;
        self.done = is_final;
        Ok(Some(chunk))
    }

    /// Bytes handed out so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    async fn fill(&mut self, buf: &mut Vec<u8>) -> std::io::Result<()> {
        while buf.len() < self.chunk_size {
            let start = buf.len();
            buf.resize(self.chunk_size, 0);
            let n = self.reader.read(&mut buf[start..]).await?;
            buf.truncate(start + n);
            if n == 0 {
                self.eof = true;
                break;
            }
        }
        Ok(())
    }

    /// Returns `true` if the stream has ended; otherwise keeps the read bytes.
    async fn probe_end(&mut self) -> std::io::Result<bool> {
        let mut probe = vec![0u8; self.chunk_size];
        let n = self.reader.read(&mut probe).await?;
        if n == 0 {
            self.eof = true;
            return Ok(true);
        }
        probe.truncate(n);
        debug!(
            declared = self.declared_size,
            extra = n,
            "stream continues past declared size"
        );
        self.carry = probe;
        Ok(false)
    }
}

// ---------------------------------------------------------------------------
// ChunkedUploader
// ---------------------------------------------------------------------------

/// Drives a begin / append / finish upload session for one object.
pub struct ChunkedUploader<'a> {
    storage: &'a dyn StorageService,
    chunk_size: usize,
    progress: &'a dyn ProgressSink,
    cancel: CancellationToken,
    session: Option<UploadSession>,
}

impl<'a> ChunkedUploader<'a> {
    pub fn new(storage: &'a dyn StorageService, chunk_size: usize) -> Self {
        Self {
            storage,
            chunk_size,
            progress: &NoProgress,
            cancel: CancellationToken::new(),
            session: None,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The session opened by [`upload`](Self::upload), if any.
    pub fn session(&self) -> Option<&UploadSession> {
        self.session.as_ref()
    }

    /// Bytes acknowledged by the service so far.
    pub fn acknowledged_bytes(&self) -> u64 {
        self.session.as_ref().map_or(0, UploadSession::cursor_offset)
    }

    /// Streams `source` through a new upload session and commits it.
    ///
    /// On failure the session is left open on the service; nothing is
    /// resumed or cleaned up.
    pub async fn upload<R>(
        &mut self,
        source: R,
        declared_size: u64,
        commit: CommitInfo,
    ) -> Result<StoredObject, TransferError>
    where
        R: AsyncRead + Unpin,
    {
        let storage = self.storage;
        let cancel = self.cancel.clone();

        let session_id = until_cancelled(&cancel, storage.begin_session()).await??;
        info!(
            session = %session_id,
            path = %commit.path,
            declared_size,
            "upload session started"
        );
        let session = self.session.insert(UploadSession::new(session_id));

        let mut reader = ChunkReader::new(source, self.chunk_size, declared_size);
        let mut hasher = ContentHasher::new();

        loop {
            let Some(chunk) = until_cancelled(&cancel, reader.next_chunk()).await?? else {
                return Err(TransferError::ProtocolViolation(
                    "source ended without a final chunk".into(),
                ));
            };

            if chunk.offset != session.cursor_offset() {
                return Err(TransferError::ProtocolViolation(format!(
                    "chunk at offset {} but session cursor is at {}",
                    chunk.offset,
                    session.cursor_offset()
                )));
            }

            hasher.update(&chunk.data);
            let len = chunk.len();
            let offset = session.cursor_offset();

            if chunk.is_final {
                let commit = commit.with_content_hash(hasher.finish());
                let stored = until_cancelled(
                    &cancel,
                    storage.finish_session(session.id(), offset, chunk.data, &commit),
                )
                .await??;
                session.acknowledge(len);
                report(self.progress, session, declared_size);

                let total = session.cursor_offset();
                if let Some(ref hash) = commit.content_hash {
                    stored.verify(total, hash)?;
                }
                info!(
                    session = %session.id(),
                    path = %stored.path,
                    bytes = total,
                    chunks = session.chunks_acknowledged(),
                    "upload session committed"
                );
                return Ok(stored);
            }

            until_cancelled(
                &cancel,
                storage.append_to_session(session.id(), offset, chunk.data),
            )
            .await??;
            session.acknowledge(len);
            debug!(
                session = %session.id(),
                chunk = chunk.index,
                offset,
                len,
                "chunk appended"
            );
            report(self.progress, session, declared_size);
        }
    }
}

fn report(progress: &dyn ProgressSink, session: &UploadSession, declared_size: u64) {
    progress.report(&ProgressEvent {
        chunk_index: session.chunks_acknowledged(),
        bytes_transferred: session.cursor_offset(),
        total_bytes: declared_size,
    });
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Mutex;

    use super::*;
    use crate::error::FailureKind;
    use crate::fake::{Call, FakeStorage};
    use crate::storage::{StorageError, WriteMode};

    fn commit() -> CommitInfo {
        CommitInfo::new("/obj.bin", WriteMode::Overwrite)
    }

    async fn collect(mut reader: ChunkReader<impl AsyncRead + Unpin>) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        while let Some(c) = reader.next_chunk().await.unwrap() {
            chunks.push(c);
        }
        chunks
    }

    #[test]
    fn content_hash_of_empty_input() {
        // SHA-256 over zero block digests is the hash of the empty string.
        assert_eq!(
            content_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn content_hash_small_input_is_hash_of_block_hash() {
        let block = Sha256::digest(b"abc");
        let expected = hex::encode(Sha256::digest(block));
        assert_eq!(content_hash(b"abc"), expected);
    }

    #[test]
    fn content_hash_incremental_matches_one_shot() {
        let data: Vec<u8> = (0..CONTENT_HASH_BLOCK_SIZE + 1000)
            .map(|i| (i % 251) as u8)
            .collect();
        let mut hasher = ContentHasher::new();
        for piece in data.chunks(999_983) {
            hasher.update(piece);
        }
        assert_eq!(hasher.finish(), content_hash(&data));
    }

    #[tokio::test]
    async fn reader_splits_exact_multiple() {
        let chunks = collect(ChunkReader::new(&b"AABBCCDD"[..], 4, 8)).await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].data, b"AABB");
        assert!(!chunks[0].is_final);
        assert_eq!(chunks[1].offset, 4);
        assert_eq!(chunks[1].data, b"CCDD");
        assert!(chunks[1].is_final);
    }

    #[tokio::test]
    async fn reader_short_tail_is_final() {
        let chunks = collect(ChunkReader::new(&b"AABBCCDDEE"[..], 4, 10)).await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].offset, 8);
        assert_eq!(chunks[2].data, b"EE");
        assert!(chunks[2].is_final);
        assert!(chunks[..2].iter().all(|c| !c.is_final));
    }

    #[tokio::test]
    async fn reader_empty_stream_yields_one_empty_final_chunk() {
        let chunks = collect(ChunkReader::new(&b""[..], 4, 0)).await;
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_empty());
        assert!(chunks[0].is_final);
    }

    #[tokio::test]
    async fn reader_short_reads_are_not_final() {
        let mock = tokio_test::io::Builder::new()
            .read(b"ab")
            .read(b"cd")
            .read(b"e")
            .read(b"fgh")
            .build();
        let chunks = collect(ChunkReader::new(mock, 4, 8)).await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].data, b"abcd");
        assert!(!chunks[0].is_final);
        assert_eq!(chunks[1].data, b"efgh");
        assert!(chunks[1].is_final);
    }

    #[tokio::test]
    async fn reader_ignores_stale_declared_size() {
        let chunks = collect(ChunkReader::new(&b"0123456789"[..], 4, 4)).await;
        let sizes: Vec<_> = chunks.iter().map(|c| c.data.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        let offsets: Vec<_> = chunks.iter().map(|c| c.offset).collect();
        assert_eq!(offsets, vec![0, 4, 8]);
        assert!(chunks[2].is_final);
        assert!(!chunks[0].is_final && !chunks[1].is_final);
    }

    #[tokio::test]
    async fn reader_stream_shorter_than_declared_on_boundary() {
        let chunks = collect(ChunkReader::new(&b"01234567"[..], 4, 12)).await;
        assert_eq!(chunks.len(), 3);
        assert!(!chunks[1].is_final);
        assert!(chunks[2].is_empty());
        assert!(chunks[2].is_final);
        assert_eq!(chunks[2].offset, 8);
    }

    #[tokio::test]
    async fn reader_default_chunk_size() {
        let reader = ChunkReader::new(&b"x"[..], 0, 1);
        assert_eq!(reader.chunk_size(), DEFAULT_CHUNK_SIZE);
    }

    #[tokio::test]
    async fn upload_offsets_are_gap_free() {
        let storage = FakeStorage::new();
        let data: Vec<u8> = (0..26u8).collect();
        let mut uploader = ChunkedUploader::new(&storage, 5);
        let stored = uploader.upload(&data[..], 26, commit()).await.unwrap();

        assert_eq!(stored.size, Some(26));
        assert_eq!(uploader.acknowledged_bytes(), 26);

        let calls = storage.calls();
        assert_eq!(calls[0], Call::Begin);
        let mut expected = 0;
        for call in &calls[1..] {
            match call {
                Call::Append { offset, len, .. } => {
                    assert_eq!(*offset, expected);
                    expected += *len as u64;
                }
                Call::Finish { offset, len, .. } => {
                    assert_eq!(*offset, expected);
                    expected += *len as u64;
                }
                other => panic!("unexpected call {other:?}"),
            }
        }
        assert_eq!(expected, 26);
        assert_eq!(storage.append_count(), 5);
        assert_eq!(storage.finish_count(), 1);
    }

    #[tokio::test]
    async fn upload_finish_is_last_call() {
        let storage = FakeStorage::new();
        let mut uploader = ChunkedUploader::new(&storage, 4);
        uploader.upload(&b"AABBCCDD"[..], 8, commit()).await.unwrap();

        let calls = storage.calls();
        let finish_pos = calls
            .iter()
            .position(|c| matches!(c, Call::Finish { .. }))
            .unwrap();
        assert_eq!(finish_pos, calls.len() - 1);
        assert!(matches!(calls[finish_pos], Call::Finish { len: 4, offset: 4, .. }));
    }

    #[tokio::test]
    async fn upload_zero_length_object() {
        let storage = FakeStorage::new();
        let mut uploader = ChunkedUploader::new(&storage, 4);
        let stored = uploader.upload(&b""[..], 0, commit()).await.unwrap();

        assert_eq!(stored.size, Some(0));
        assert_eq!(
            storage.calls(),
            vec![
                Call::Begin,
                Call::Finish {
                    session: "session-1".into(),
                    offset: 0,
                    len: 0,
                    path: "/obj.bin".into(),
                    mode: WriteMode::Overwrite,
                },
            ]
        );
    }

    #[tokio::test]
    async fn upload_boundary_end_commits_empty_payload() {
        let storage = FakeStorage::new();
        let mut uploader = ChunkedUploader::new(&storage, 4);
        uploader.upload(&b"01234567"[..], 12, commit()).await.unwrap();
        assert_eq!(storage.append_count(), 2);
        assert!(matches!(
            storage.calls().last(),
            Some(Call::Finish { offset: 8, len: 0, .. })
        ));
    }

    #[tokio::test]
    async fn upload_reports_every_chunk() {
        let storage = FakeStorage::new();
        let events = Mutex::new(Vec::new());
        let sink = |e: &ProgressEvent| events.lock().unwrap().push(*e);
        let mut uploader = ChunkedUploader::new(&storage, 4).with_progress(&sink);
        uploader.upload(&b"AABBCCDDEE"[..], 10, commit()).await.unwrap();

        let events = events.into_inner().unwrap();
        let indexes: Vec<_> = events.iter().map(|e| e.chunk_index).collect();
        assert_eq!(indexes, vec![1, 2, 3]);
        let bytes: Vec<_> = events.iter().map(|e| e.bytes_transferred).collect();
        assert_eq!(bytes, vec![4, 8, 10]);
        assert!(events.iter().all(|e| e.total_bytes == 10));
    }

    #[tokio::test]
    async fn upload_sends_content_hash_with_commit() {
        let storage = FakeStorage::new();
        let mut uploader = ChunkedUploader::new(&storage, 4);
        uploader.upload(&b"AABBCCDDEE"[..], 10, commit()).await.unwrap();
        assert_eq!(
            storage.last_commit().unwrap().content_hash,
            Some(content_hash(b"AABBCCDDEE"))
        );
    }

    #[tokio::test]
    async fn append_failure_aborts_without_further_calls() {
        let storage = FakeStorage::new().fail_append_at(2, StorageError::Network("reset".into()));
        let mut uploader = ChunkedUploader::new(&storage, 4);
        let err = uploader
            .upload(&b"AABBCCDDEEFF"[..], 12, commit())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::NetworkFailure);
        assert_eq!(uploader.acknowledged_bytes(), 4);
        assert_eq!(storage.append_count(), 2);
        assert_eq!(storage.finish_count(), 0);
    }

    #[tokio::test]
    async fn incorrect_offset_is_protocol_violation() {
        let storage = FakeStorage::new().fail_append_at(1, StorageError::IncorrectOffset { expected: 2 });
        let mut uploader = ChunkedUploader::new(&storage, 4);
        let err = uploader
            .upload(&b"AABBCCDD"[..], 8, commit())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::ProtocolViolation);
        assert_eq!(uploader.acknowledged_bytes(), 0);
    }

    #[tokio::test]
    async fn source_read_error_mid_stream() {
        let mock = tokio_test::io::Builder::new()
            .read(b"abcd")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let storage = FakeStorage::new();
        let mut uploader = ChunkedUploader::new(&storage, 4);
        let err = uploader.upload(mock, 12, commit()).await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::NetworkFailure);
        assert_eq!(uploader.acknowledged_bytes(), 4);
        assert_eq!(storage.finish_count(), 0);
    }

    #[tokio::test]
    async fn hash_mismatch_after_finish() {
        let storage = FakeStorage::new().corrupt_hash();
        let mut uploader = ChunkedUploader::new(&storage, 4);
        let err = uploader
            .upload(&b"AABBCC"[..], 6, commit())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::ProtocolViolation);
    }

    #[tokio::test]
    async fn cancelled_before_start_issues_no_calls() {
        let storage = FakeStorage::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut uploader = ChunkedUploader::new(&storage, 4).with_cancel(cancel);
        let err = uploader
            .upload(&b"AABB"[..], 4, commit())
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Cancelled));
        assert!(storage.calls().is_empty());
        assert!(uploader.session().is_none());
    }

    #[tokio::test]
    async fn cancel_mid_transfer_leaves_session_open() {
        let storage = FakeStorage::new();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let sink = move |e: &ProgressEvent| {
            if e.chunk_index == 1 {
                trigger.cancel();
            }
        };
        let mut uploader = ChunkedUploader::new(&storage, 4)
            .with_progress(&sink)
            .with_cancel(cancel);
        let err = uploader
            .upload(&b"AABBCCDDEEFF"[..], 12, commit())
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::Cancelled));
        assert_eq!(storage.append_count(), 1);
        assert_eq!(storage.finish_count(), 0);
        assert_eq!(uploader.session().unwrap().cursor_offset(), 4);
    }
}
