//! Telegram Bot API client.
//!
//! Methods are called as `POST {base}/bot{token}/{method}` with a JSON body;
//! files are downloaded from `{base}/file/bot{token}/{file_path}`.

use std::time::Duration;

use futures_util::TryStreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::{debug, trace};

use crate::error::TelegramError;
use crate::types::{ApiResponse, File, Message, Update, User};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Grace period on top of the long-poll timeout before the request is
/// considered dead.
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Bot API client bound to one bot token.
#[derive(Clone)]
pub struct BotClient {
    http: reqwest::Client,
    token: String,
    api_base: String,
}

impl std::fmt::Debug for BotClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl BotClient {
    /// Creates a client against `api_base` (the public Bot API when `None`).
    pub fn new(token: impl Into<String>, api_base: Option<&str>) -> Result<Self, TelegramError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self::with_http(http, token, api_base))
    }

    pub fn with_http(http: reqwest::Client, token: impl Into<String>, api_base: Option<&str>) -> Self {
        Self {
            http,
            token: token.into(),
            api_base: api_base
                .unwrap_or(DEFAULT_API_BASE)
                .trim_end_matches('/')
                .to_string(),
        }
    }

    /// Returns the bot's own user; used as a startup token check.
    pub async fn get_me(&self) -> Result<User, TelegramError> {
        self.call("getMe", &json!({}), None).await
    }

    /// Long-polls for message updates after `offset`.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, TelegramError> {
        let body = json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message"],
        });
        let updates: Vec<Update> = self
            .call(
                "getUpdates",
                &body,
                Some(Duration::from_secs(timeout_secs) + POLL_GRACE),
            )
            .await?;
        trace!(count = updates.len(), offset, "updates received");
        Ok(updates)
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<Message, TelegramError> {
        self.call(
            "sendMessage",
            &json!({ "chat_id": chat_id, "text": text }),
            None,
        )
        .await
    }

    /// Replaces the text of a sent message. An unchanged text is not an error.
    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), TelegramError> {
        let body = json!({ "chat_id": chat_id, "message_id": message_id, "text": text });
        match self.call::<serde_json::Value>("editMessageText", &body, None).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_modified() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Resolves a file id to its download path.
    pub async fn get_file(&self, file_id: &str) -> Result<File, TelegramError> {
        self.call("getFile", &json!({ "file_id": file_id }), None).await
    }

    /// Opens a streamed download of `file_path`.
    ///
    /// Returns the body as a reader and the `Content-Length`, if any. Bytes
    /// are pulled from the network only as the reader is consumed.
    pub async fn download(
        &self,
        file_path: &str,
    ) -> Result<(Box<dyn AsyncRead + Send + Unpin>, Option<u64>), TelegramError> {
        let url = format!(
            "{}/file/bot{}/{}",
            self.api_base,
            self.token,
            file_path.trim_start_matches('/')
        );
        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TelegramError::Download(status.as_u16()));
        }
        let length = resp.content_length();
        debug!(?length, "download opened");

        let stream = Box::pin(
            resp.bytes_stream()
                .map_err(|e| std::io::Error::other(e.without_url())),
        );
        Ok((Box::new(StreamReader::new(stream)), length))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &impl Serialize,
        timeout: Option<Duration>,
    ) -> Result<T, TelegramError> {
        let url = format!("{}/bot{}/{method}", self.api_base, self.token);
        let mut req = self.http.post(&url).json(body);
        if let Some(timeout) = timeout {
            req = req.timeout(timeout);
        }
        let bytes = req.send().await?.bytes().await?;
        let resp: ApiResponse<T> = serde_json::from_slice(&bytes)?;
        match resp {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            other => Err(TelegramError::Api {
                code: other.error_code.unwrap_or(0),
                description: other
                    .description
                    .unwrap_or_else(|| format!("{method} returned no result")),
                retry_after: other.parameters.and_then(|p| p.retry_after),
            }),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    use super::*;

    /// Serves `responses` on consecutive connections and returns the request
    /// lines it saw.
    pub(crate) async fn mock_server(
        responses: Vec<(u16, String)>,
    ) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let mut seen = Vec::new();
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().await.unwrap();
                let head = read_request(&mut stream).await;
                seen.push(head.lines().next().unwrap_or_default().to_string());

                let resp = format!(
                    "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(resp.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
            seen
        });

        (url, handle)
    }

    /// Reads one request (head and body) and returns the head.
    async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
        let mut raw = Vec::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
            let Some(end) = raw.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&raw[..end]).into_owned();
            let length: usize = head
                .lines()
                .find_map(|l| {
                    let (name, value) = l.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse().ok())?
                })
                .unwrap_or(0);
            while raw.len() < end + 4 + length {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
            }
            return head;
        }
        String::from_utf8_lossy(&raw).into_owned()
    }

    fn client(url: &str) -> BotClient {
        BotClient::new("123:ABC", Some(url)).unwrap()
    }

    #[tokio::test]
    async fn get_me() {
        let body = r#"{"ok":true,"result":{"id":1,"is_bot":true,"first_name":"Ferry","username":"ferry_bot"}}"#;
        let (url, handle) = mock_server(vec![(200, body.into())]).await;
        let me = client(&url).get_me().await.unwrap();
        assert_eq!(me.username.as_deref(), Some("ferry_bot"));

        let seen = handle.await.unwrap();
        assert_eq!(seen[0], "POST /bot123:ABC/getMe HTTP/1.1");
    }

    #[tokio::test]
    async fn get_updates() {
        let body = r#"{"ok":true,"result":[
            {"update_id":3,"message":{"message_id":1,"chat":{"id":5,"type":"private"},"text":"/start"}},
            {"update_id":4}]}"#;
        let (url, handle) = mock_server(vec![(200, body.into())]).await;
        let updates = client(&url).get_updates(3, 0).await.unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].message.as_ref().unwrap().command(), Some("start"));
        handle.abort();
    }

    #[tokio::test]
    async fn api_error() {
        let body = r#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#;
        let (url, handle) = mock_server(vec![(401, body.into())]).await;
        let err = client(&url).get_me().await.unwrap_err();
        assert!(matches!(err, TelegramError::Api { code: 401, .. }));
        assert!(!err.to_string().contains("123:ABC"));
        handle.abort();
    }

    #[tokio::test]
    async fn edit_not_modified_is_ok() {
        let body = r#"{"ok":false,"error_code":400,"description":"Bad Request: message is not modified"}"#;
        let (url, handle) = mock_server(vec![(400, body.into())]).await;
        client(&url).edit_message_text(5, 9, "same").await.unwrap();
        handle.abort();
    }

    #[tokio::test]
    async fn download_streams_body() {
        let (url, handle) = mock_server(vec![(200, "0123456789".into())]).await;
        let (mut reader, length) = client(&url).download("documents/file_1.pdf").await.unwrap();
        assert_eq!(length, Some(10));
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await.unwrap();
        assert_eq!(data, b"0123456789");

        let seen = handle.await.unwrap();
        assert_eq!(seen[0], "GET /file/bot123:ABC/documents/file_1.pdf HTTP/1.1");
    }

    #[tokio::test]
    async fn download_error_status() {
        let (url, handle) = mock_server(vec![(404, "missing".into())]).await;
        let err = client(&url).download("x").await.err().unwrap();
        assert!(matches!(err, TelegramError::Download(404)));
        handle.abort();
    }
}
