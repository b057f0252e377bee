use dropferry_transfer::StorageError;
use serde_json::Value;

/// Errors from the Dropbox client.
#[derive(Debug, thiserror::Error)]
pub enum DropboxError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {summary}")]
    Api { status: u16, summary: String },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The session holds a different number of bytes than the request assumed.
    #[error("incorrect offset, service expects {correct_offset}")]
    IncorrectOffset { correct_offset: u64 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid access token")]
    InvalidToken,

    #[error("failed to fetch access token: HTTP {0}")]
    TokenFetch(u16),
}

impl DropboxError {
    /// Maps a non-2xx response into an error.
    ///
    /// Dropbox reports endpoint errors as HTTP 409 with a JSON body carrying
    /// `error_summary` and a tagged `error` union; an offset mismatch is
    /// recognised by a `correct_offset` anywhere inside that union.
    pub(crate) fn from_response(status: u16, body: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let summary = parsed
            .as_ref()
            .and_then(|v| v.get("error_summary"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| body.trim().to_string());

        if status == 401 {
            return Self::Unauthorized(summary);
        }
        if status == 409
            && let Some(correct_offset) = parsed
                .as_ref()
                .and_then(|v| v.get("error"))
                .and_then(find_correct_offset)
        {
            return Self::IncorrectOffset { correct_offset };
        }
        Self::Api { status, summary }
    }
}

fn find_correct_offset(value: &Value) -> Option<u64> {
    match value {
        Value::Object(map) => map
            .get("correct_offset")
            .and_then(Value::as_u64)
            .or_else(|| map.values().find_map(find_correct_offset)),
        _ => None,
    }
}

impl From<DropboxError> for StorageError {
    fn from(err: DropboxError) -> Self {
        match err {
            DropboxError::IncorrectOffset { correct_offset } => StorageError::IncorrectOffset {
                expected: correct_offset,
            },
            DropboxError::Unauthorized(_) | DropboxError::InvalidToken => {
                StorageError::Rejected(err.to_string())
            }
            other => StorageError::Network(other.to_string()),
        }
    }
}
