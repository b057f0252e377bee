use dropferry_transfer::TransferError;

/// Errors from the Telegram Bot API client.
#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    /// Transport failure. The request URL is stripped since it embeds the
    /// bot token.
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("Bot API error {code}: {description}")]
    Api {
        code: i64,
        description: String,
        /// Seconds to wait before retrying, when the API asks for it.
        retry_after: Option<u64>,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("download failed: HTTP {0}")]
    Download(u16),

    #[error("file {0} has no download path")]
    NoFilePath(String),
}

impl From<reqwest::Error> for TelegramError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.without_url())
    }
}

impl TelegramError {
    /// `editMessageText` reports an unchanged text as a 400; callers treat
    /// it as success.
    pub fn is_not_modified(&self) -> bool {
        matches!(self, Self::Api { code: 400, description, .. }
            if description.contains("message is not modified"))
    }

    /// Client errors that asking again will not change, such as `getFile`
    /// answering "file is too big". Rate limiting (429) is not permanent.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Api { code, .. } => (400..500).contains(code) && *code != 429,
            Self::Download(status) => (400..500).contains(status) && *status != 429,
            _ => false,
        }
    }
}

impl From<TelegramError> for TransferError {
    fn from(err: TelegramError) -> Self {
        if err.is_permanent() {
            TransferError::SourceRefused(err.to_string())
        } else {
            TransferError::SourceUnavailable(err.to_string())
        }
    }
}
