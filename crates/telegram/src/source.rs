use dropferry_transfer::{ObjectRef, SourceFuture, SourceProvider, SourceStream, TransferError};
use tracing::debug;

use crate::client::BotClient;
use crate::error::TelegramError;

/// Opens Telegram files as transfer sources.
///
/// Each open resolves the file with `getFile` and starts a streamed
/// download; nothing is buffered ahead of the reader.
#[derive(Debug, Clone)]
pub struct TelegramSource {
    client: BotClient,
}

impl TelegramSource {
    pub fn new(client: BotClient) -> Self {
        Self { client }
    }

    async fn open(&self, object: &ObjectRef) -> Result<SourceStream, TelegramError> {
        let file = self.client.get_file(&object.file_id).await?;
        let path = file
            .file_path
            .ok_or_else(|| TelegramError::NoFilePath(object.file_id.clone()))?;
        debug!(file_id = %object.file_id, size = ?file.file_size, "resolved file");

        let (reader, length) = self.client.download(&path).await?;
        let suggested_name = path
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        Ok(SourceStream {
            reader,
            declared_size: file.file_size.or(length),
            suggested_name,
        })
    }
}

impl SourceProvider for TelegramSource {
    fn open_stream<'a>(&'a self, object: &'a ObjectRef) -> SourceFuture<'a> {
        Box::pin(async move { self.open(object).await.map_err(TransferError::from) })
    }
}
