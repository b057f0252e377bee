//! Bot runtime: wires Dropbox, Telegram and the transfer pipeline together
//! and runs the long-poll loop until shutdown.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Context;
use dropferry_dropbox::{DropboxClient, fetch_access_token};
use dropferry_telegram::{BotClient, Message, TelegramError, TelegramSource, object_ref};
use dropferry_transfer::{
    ChannelProgress, ObjectRef, ProgressEvent, ProgressThrottle, RetryPolicy, SpeedCalculator,
    StorageService, TransferLimits, TransferOrchestrator, TransferResult, destination_path,
};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, Secrets};
use crate::messages;

/// Pause after a failed `getUpdates` before polling again.
const POLL_BACKOFF: Duration = Duration::from_secs(3);

/// How long running transfers get to wind down after shutdown is requested.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

/// Runs the bot until Ctrl-C.
pub async fn run(config: Config, secrets: Secrets) -> anyhow::Result<()> {
    let limits = config.limits()?;
    // Reject a bad destination root before accepting any file.
    destination_path(&config.destination_root, "probe").context("invalid destination_root")?;

    // -- Dropbox --
    let token = fetch_access_token(&reqwest::Client::new(), &secrets.dropbox_token_url)
        .await
        .context("fetching Dropbox access token")?;
    // TODO: refetch the token when Dropbox answers `expired_access_token`;
    // short-lived tokens currently need a restart once they expire.
    let dropbox = Arc::new(DropboxClient::new(&token)?);
    let account = dropbox
        .current_account()
        .await
        .context("connecting to Dropbox")?;
    info!(email = %account.email, "connected to Dropbox account");

    // -- Telegram --
    let bot = BotClient::new(secrets.bot_token, config.telegram_api_base.as_deref())?;
    let me = bot.get_me().await.context("checking Telegram bot token")?;
    info!(
        username = me.username.as_deref().unwrap_or_default(),
        "connected to Telegram"
    );

    let storage: Arc<dyn StorageService> = dropbox.clone();
    let orchestrator = TransferOrchestrator::new(storage, limits)
        .with_destination_root(config.destination_root.clone())
        .with_write_mode(config.write_mode());

    let shutdown = CancellationToken::new();
    let ctx = Arc::new(BotContext {
        source: TelegramSource::new(bot.clone()),
        bot,
        dropbox,
        orchestrator,
        retry: config.retry_policy(),
        limits,
        slots: Arc::new(Semaphore::new(config.max_concurrent_transfers)),
        chats: ChatRegistry::new(shutdown.clone()),
        config,
    });

    info!("bot ready");

    let mut tasks = JoinSet::new();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut offset = 0;

    loop {
        let polled = tokio::select! {
            biased;
            _ = &mut ctrl_c => {
                info!("SIGINT received, shutting down");
                break;
            }
            polled = ctx.bot.get_updates(offset, ctx.config.poll_timeout_seconds) => polled,
        };

        match polled {
            Ok(updates) => {
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    if let Some(message) = update.message {
                        tasks.spawn(Arc::clone(&ctx).handle_message(message));
                    }
                }
            }
            Err(e) => {
                let pause = match e {
                    TelegramError::Api {
                        retry_after: Some(secs),
                        ..
                    } => Duration::from_secs(secs),
                    _ => POLL_BACKOFF,
                };
                warn!(error = %e, pause_secs = pause.as_secs(), "getUpdates failed");
                tokio::select! {
                    biased;
                    _ = &mut ctrl_c => {
                        info!("SIGINT received, shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }

        while let Some(joined) = tasks.try_join_next() {
            if let Err(e) = joined
                && e.is_panic()
            {
                error!("message handler panicked: {e}");
            }
        }
    }

    // -- Graceful shutdown --
    shutdown.cancel();
    info!(pending = tasks.len(), "waiting for running transfers");
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(pending = tasks.len(), "transfers still running at shutdown, aborting");
        tasks.shutdown().await;
    }

    Ok(())
}

struct BotContext {
    bot: BotClient,
    source: TelegramSource,
    dropbox: Arc<DropboxClient>,
    orchestrator: TransferOrchestrator,
    retry: RetryPolicy,
    limits: TransferLimits,
    slots: Arc<Semaphore>,
    chats: ChatRegistry,
    config: Config,
}

impl BotContext {
    async fn handle_message(self: Arc<Self>, message: Message) {
        let chat_id = message.chat.id;

        if let Some(command) = message.command() {
            debug!(chat_id, command, "command received");
            let reply = match command {
                "start" => messages::welcome(&self.limits),
                "help" => messages::help(&self.limits),
                "status" => self.status_text().await,
                "cancel" => messages::cancelled(self.chats.cancel(chat_id)),
                _ => return,
            };
            self.reply(chat_id, &reply).await;
            return;
        }

        match object_ref(&message) {
            Some(object) => self.transfer(chat_id, object).await,
            None => debug!(chat_id, "ignoring message without media"),
        }
    }

    async fn status_text(&self) -> String {
        let account = self.dropbox.current_account().await;
        let dropbox = match &account {
            Ok(account) => Ok(account.email.as_str()),
            Err(e) => {
                warn!(error = %e, "Dropbox status check failed");
                Err("unreachable")
            }
        };
        messages::status(
            dropbox,
            &self.limits,
            self.orchestrator.destination_root(),
            self.chats.active(),
        )
    }

    async fn reply(&self, chat_id: i64, text: &str) -> Option<i64> {
        match self.bot.send_message(chat_id, text).await {
            Ok(sent) => Some(sent.message_id),
            Err(e) => {
                warn!(chat_id, error = %e, "failed to send message");
                None
            }
        }
    }

    async fn edit(&self, chat_id: i64, message_id: Option<i64>, text: &str) {
        let Some(message_id) = message_id else {
            return;
        };
        if let Err(e) = self.bot.edit_message_text(chat_id, message_id, text).await {
            debug!(chat_id, message_id, error = %e, "failed to edit status message");
        }
    }

    /// Runs one transfer end to end, reporting through a status message.
    async fn transfer(&self, chat_id: i64, object: ObjectRef) {
        let name = object.display_name();
        let status_id = self
            .reply(
                chat_id,
                &messages::processing(&name, object.kind.as_str(), object.file_size),
            )
            .await;

        let cancel = self.chats.begin(chat_id);
        let result = {
            let (sink, events) = ChannelProgress::channel(16);
            let reporter = self.report_progress(chat_id, status_id, &name, events);
            let upload = async {
                let result = self.run_transfer(&object, &sink, &cancel).await;
                drop(sink);
                result
            };
            let (result, ()) = tokio::join!(upload, reporter);
            result
        };
        self.chats.end(chat_id, &cancel);

        info!(
            chat_id,
            name = %name,
            succeeded = result.succeeded,
            bytes = result.bytes_transferred,
            attempts = result.attempts,
            reason = ?result.failure_reason,
            "transfer finished"
        );
        let text = messages::result(&name, object.file_size, &result, &self.limits);
        self.edit(chat_id, status_id, &text).await;
    }

    async fn run_transfer(
        &self,
        object: &ObjectRef,
        sink: &ChannelProgress,
        cancel: &CancellationToken,
    ) -> TransferResult {
        // Waiting for a slot is cancellable like the transfer itself.
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = Arc::clone(&self.slots).acquire_owned() => permit.ok(),
        };

        let orchestrator = &self.orchestrator;
        let source = &self.source;
        self.retry
            .run(cancel, |attempt| async move {
                if attempt > 1 {
                    info!(file_id = %object.file_id, attempt, "retrying transfer");
                }
                orchestrator
                    .transfer_object(source, object, sink, cancel)
                    .await
            })
            .await
    }

    /// Turns progress events into throttled status edits until the sender
    /// side is dropped.
    async fn report_progress(
        &self,
        chat_id: i64,
        status_id: Option<i64>,
        name: &str,
        mut events: mpsc::Receiver<ProgressEvent>,
    ) {
        let mut throttle = ProgressThrottle::new(Some(self.config.progress_interval()));
        let mut speed = SpeedCalculator::default();
        let mut last_bytes = 0;

        while let Some(event) = events.recv().await {
            // A retry restarts the byte count.
            if event.bytes_transferred < last_bytes {
                speed.reset();
                last_bytes = 0;
            }
            speed.add_sample(event.bytes_transferred - last_bytes);
            last_bytes = event.bytes_transferred;

            if !throttle.ready(Instant::now()) {
                continue;
            }
            let eta = speed.eta(event.total_bytes.saturating_sub(event.bytes_transferred));
            let text = messages::progress(name, &event, speed.bytes_per_second(), eta);
            self.edit(chat_id, status_id, &text).await;
        }
    }
}

// ---------------------------------------------------------------------------
// ChatRegistry
// ---------------------------------------------------------------------------

struct ChatTransfers {
    cancel: CancellationToken,
    active: usize,
}

/// Per-chat cancellation tokens, all children of the shutdown token.
///
/// A chat keeps one token while it has transfers running; `/cancel` fires
/// it and the next transfer in that chat starts with a fresh one.
struct ChatRegistry {
    shutdown: CancellationToken,
    chats: Mutex<HashMap<i64, ChatTransfers>>,
}

impl ChatRegistry {
    fn new(shutdown: CancellationToken) -> Self {
        Self {
            shutdown,
            chats: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a transfer and returns its token.
    fn begin(&self, chat_id: i64) -> CancellationToken {
        let mut chats = self.chats.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = chats.entry(chat_id).or_insert_with(|| ChatTransfers {
            cancel: self.shutdown.child_token(),
            active: 0,
        });
        if entry.cancel.is_cancelled() {
            entry.cancel = self.shutdown.child_token();
            entry.active = 0;
        }
        entry.active += 1;
        entry.cancel.clone()
    }

    /// Unregisters a finished transfer.
    fn end(&self, chat_id: i64, cancel: &CancellationToken) {
        // A cancelled token was already accounted for by `cancel`.
        if cancel.is_cancelled() {
            return;
        }
        let mut chats = self.chats.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = chats.get_mut(&chat_id) {
            entry.active = entry.active.saturating_sub(1);
            if entry.active == 0 {
                chats.remove(&chat_id);
            }
        }
    }

    /// Cancels every running transfer of the chat; returns how many.
    fn cancel(&self, chat_id: i64) -> usize {
        let mut chats = self.chats.lock().unwrap_or_else(PoisonError::into_inner);
        match chats.remove(&chat_id) {
            Some(entry) => {
                entry.cancel.cancel();
                info!(chat_id, transfers = entry.active, "transfers cancelled by user");
                entry.active
            }
            None => 0,
        }
    }

    fn active(&self) -> usize {
        let chats = self.chats.lock().unwrap_or_else(PoisonError::into_inner);
        chats.values().map(|c| c.active).sum()
    }
}
