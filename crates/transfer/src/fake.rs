//! In-memory storage backend for tests.
//!
//! Behaves like a strict session service: appends must land exactly on the
//! acknowledged cursor, and every call is recorded for inspection.

use std::sync::Mutex;

use crate::chunked::{ContentHasher, content_hash};
use crate::storage::{
    CommitInfo, StorageError, StorageFuture, StorageService, StoredObject, WriteMode,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Begin,
    Append {
        session: String,
        offset: u64,
        len: usize,
    },
    Finish {
        session: String,
        offset: u64,
        len: usize,
        path: String,
        mode: WriteMode,
    },
    Put {
        len: usize,
        path: String,
        mode: WriteMode,
    },
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    sessions: u32,
    cursor: u64,
    hasher: Option<ContentHasher>,
    appends: usize,
    last_commit: Option<CommitInfo>,
}

#[derive(Default)]
pub struct FakeStorage {
    state: Mutex<State>,
    fail_begin: Option<StorageError>,
    fail_append_at: Option<(usize, StorageError)>,
    fail_put: Option<StorageError>,
    corrupt_hash: bool,
}

impl FakeStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_begin(mut self, err: StorageError) -> Self {
        self.fail_begin = Some(err);
        self
    }

    /// Fails the `n`-th append call (one-based).
    pub fn fail_append_at(mut self, n: usize, err: StorageError) -> Self {
        self.fail_append_at = Some((n, err));
        self
    }

    pub fn fail_put(mut self, err: StorageError) -> Self {
        self.fail_put = Some(err);
        self
    }

    /// Reports a wrong content hash on commit.
    pub fn corrupt_hash(mut self) -> Self {
        self.corrupt_hash = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn append_count(&self) -> usize {
        self.count(|c| matches!(c, Call::Append { .. }))
    }

    pub fn finish_count(&self) -> usize {
        self.count(|c| matches!(c, Call::Finish { .. }))
    }

    pub fn put_count(&self) -> usize {
        self.count(|c| matches!(c, Call::Put { .. }))
    }

    pub fn last_commit(&self) -> Option<CommitInfo> {
        self.state.lock().unwrap().last_commit.clone()
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| pred(c))
            .count()
    }

    fn stored(&self, path: &str, size: u64, hash: String) -> StoredObject {
        let content_hash = if self.corrupt_hash {
            "0".repeat(64)
        } else {
            hash
        };
        StoredObject {
            path: path.to_string(),
            size: Some(size),
            content_hash: Some(content_hash),
        }
    }
}

impl StorageService for FakeStorage {
    fn begin_session(&self) -> StorageFuture<'_, String> {
        Box::pin(async move {
            let mut s = self.state.lock().unwrap();
            s.calls.push(Call::Begin);
            if let Some(ref err) = self.fail_begin {
                return Err(err.clone());
            }
            s.sessions += 1;
            s.cursor = 0;
            s.hasher = Some(ContentHasher::new());
            Ok(format!("session-{}", s.sessions))
        })
    }

    fn append_to_session<'a>(
        &'a self,
        session_id: &'a str,
        offset: u64,
        data: Vec<u8>,
    ) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            let mut s = self.state.lock().unwrap();
            s.calls.push(Call::Append {
                session: session_id.to_string(),
                offset,
                len: data.len(),
            });
            s.appends += 1;
            if let Some((n, ref err)) = self.fail_append_at
                && n == s.appends
            {
                return Err(err.clone());
            }
            if offset != s.cursor {
                return Err(StorageError::IncorrectOffset { expected: s.cursor });
            }
            s.cursor += data.len() as u64;
            if let Some(h) = s.hasher.as_mut() {
                h.update(&data);
            }
            Ok(())
        })
    }

    fn finish_session<'a>(
        &'a self,
        session_id: &'a str,
        offset: u64,
        data: Vec<u8>,
        commit: &'a CommitInfo,
    ) -> StorageFuture<'a, StoredObject> {
        Box::pin(async move {
            let mut s = self.state.lock().unwrap();
            s.calls.push(Call::Finish {
                session: session_id.to_string(),
                offset,
                len: data.len(),
                path: commit.path.clone(),
                mode: commit.mode,
            });
            if offset != s.cursor {
                return Err(StorageError::IncorrectOffset { expected: s.cursor });
            }
            s.cursor += data.len() as u64;
            s.last_commit = Some(commit.clone());
            let mut hasher = s.hasher.take().unwrap_or_default();
            hasher.update(&data);
            let size = s.cursor;
            Ok(self.stored(&commit.path, size, hasher.finish()))
        })
    }

    fn put_object<'a>(
        &'a self,
        data: Vec<u8>,
        commit: &'a CommitInfo,
    ) -> StorageFuture<'a, StoredObject> {
        Box::pin(async move {
            let mut s = self.state.lock().unwrap();
            s.calls.push(Call::Put {
                len: data.len(),
                path: commit.path.clone(),
                mode: commit.mode,
            });
            if let Some(ref err) = self.fail_put {
                return Err(err.clone());
            }
            s.last_commit = Some(commit.clone());
            Ok(self.stored(&commit.path, data.len() as u64, content_hash(&data)))
        })
    }
}
