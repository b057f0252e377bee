//! Dropbox v2 HTTP client.
//!
//! Content endpoints take their arguments as JSON in the `Dropbox-API-Arg`
//! header and the payload as an octet-stream body; RPC endpoints take a JSON
//! body.

use dropferry_transfer::{CommitInfo, StorageError, StorageFuture, StorageService, StoredObject};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::DropboxError;
use crate::types::{
    Account, AppendArg, Commit, Cursor, FileMetadata, FinishArg, StartArg, StartResult, UploadArg,
    header_json,
};

const DEFAULT_API_URL: &str = "https://api.dropboxapi.com/2";
const DEFAULT_CONTENT_URL: &str = "https://content.dropboxapi.com/2";
const API_ARG_HEADER: &str = "Dropbox-API-Arg";

/// Largest body Dropbox accepts on `files/upload` or one session append.
pub const MAX_REQUEST_BYTES: u64 = 150 * 1024 * 1024;

/// Dropbox API client authenticated with a bearer token.
#[derive(Clone)]
pub struct DropboxClient {
    http: reqwest::Client,
    api_url: String,
    content_url: String,
}

impl DropboxClient {
    /// Creates a client for `access_token`.
    pub fn new(access_token: &str) -> Result<Self, DropboxError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {access_token}"))
            .map_err(|_| DropboxError::InvalidToken)?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            api_url: DEFAULT_API_URL.to_string(),
            content_url: DEFAULT_CONTENT_URL.to_string(),
        })
    }

    /// Points the client at different API and content hosts.
    pub fn with_base_urls(mut self, api_url: impl Into<String>, content_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self.content_url = content_url.into();
        self
    }

    /// Returns the account the token belongs to.
    pub async fn current_account(&self) -> Result<Account, DropboxError> {
        let url = format!("{}/users/get_current_account", self.api_url);
        let resp = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body("null")
            .send()
            .await?;
        let body = check(resp).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Opens an upload session with an empty payload.
    pub async fn start_session(&self) -> Result<String, DropboxError> {
        let arg = header_json(&StartArg { close: false })?;
        let result: StartResult = self
            .content_call("upload_session/start", arg, Vec::new())
            .await?;
        debug!(session = %result.session_id, "upload session started");
        Ok(result.session_id)
    }

    /// Appends `data` at `offset`.
    pub async fn append(
        &self,
        session_id: &str,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<(), DropboxError> {
        let len = data.len();
        let arg = header_json(&AppendArg {
            cursor: Cursor { session_id, offset },
            close: false,
        })?;
        let url = format!("{}/upload_session/append_v2", self.content_url);
        check(self.content_request(&url, arg, data).send().await?).await?;
        debug!(session = %session_id, offset, len, "session append acknowledged");
        Ok(())
    }

    /// Appends the final `data` at `offset` and commits the file.
    pub async fn finish(
        &self,
        session_id: &str,
        offset: u64,
        data: Vec<u8>,
        commit: &CommitInfo,
    ) -> Result<FileMetadata, DropboxError> {
        let arg = header_json(&FinishArg {
            cursor: Cursor { session_id, offset },
            commit: Commit::new(&commit.path, commit.mode),
            content_hash: commit.content_hash.as_deref(),
        })?;
        let meta: FileMetadata = self
            .content_call("upload_session/finish", arg, data)
            .await?;
        debug!(session = %session_id, path = %commit.path, size = ?meta.size, "session committed");
        Ok(meta)
    }

    /// Uploads a whole file in one request.
    pub async fn upload(
        &self,
        data: Vec<u8>,
        commit: &CommitInfo,
    ) -> Result<FileMetadata, DropboxError> {
        let arg = header_json(&UploadArg {
            commit: Commit::new(&commit.path, commit.mode),
            content_hash: commit.content_hash.as_deref(),
        })?;
        let meta: FileMetadata = self.content_call("files/upload", arg, data).await?;
        debug!(path = %commit.path, size = ?meta.size, "file uploaded");
        Ok(meta)
    }

    fn content_request(&self, url: &str, arg: String, data: Vec<u8>) -> reqwest::RequestBuilder {
        self.http
            .post(url)
            .header(API_ARG_HEADER, arg)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(data)
    }

    async fn content_call<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        arg: String,
        data: Vec<u8>,
    ) -> Result<T, DropboxError> {
        let url = format!("{}/{endpoint}", self.content_url);
        let resp = self.content_request(&url, arg, data).send().await?;
        let body = check(resp).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Returns the body of a 2xx response, or the mapped API error.
async fn check(resp: reqwest::Response) -> Result<String, DropboxError> {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(DropboxError::from_response(status.as_u16(), &body));
    }
    Ok(body)
}

fn stored(meta: FileMetadata, commit: &CommitInfo) -> StoredObject {
    StoredObject {
        path: meta.path_display.unwrap_or_else(|| commit.path.clone()),
        size: meta.size,
        content_hash: meta.content_hash,
    }
}

impl StorageService for DropboxClient {
    fn begin_session(&self) -> StorageFuture<'_, String> {
        Box::pin(async move { self.start_session().await.map_err(StorageError::from) })
    }

    fn append_to_session<'a>(
        &'a self,
        session_id: &'a str,
        offset: u64,
        data: Vec<u8>,
    ) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            self.append(session_id, offset, data)
                .await
                .map_err(StorageError::from)
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
            let meta = self
                .finish(session_id, offset, data, commit)
                .await
                .map_err(StorageError::from)?;
            Ok::<_, StorageError>(stored(meta, commit))
        })
    }

    fn put_object<'a>(
        &'a self,
        data: Vec<u8>,
        commit: &'a CommitInfo,
    ) -> StorageFuture<'a, StoredObject> {
        Box::pin(async move {
            let meta = self.upload(data, commit).await.map_err(StorageError::from)?;
            Ok::<_, StorageError>(stored(meta, commit))
        })
    }
}
