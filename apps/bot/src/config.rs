//! Bot configuration.
//!
//! Settings are read from TOML (`$DROPFERRY_CONFIG`, else
//! `~/.config/dropferry/bot.toml`) and then overridden by `DROPFERRY_*`
//! environment variables. A missing file means defaults. Secrets are only
//! taken from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use dropferry_dropbox::MAX_REQUEST_BYTES;
use dropferry_transfer::{
    DEFAULT_CHUNK_SIZE, DEFAULT_HARD_MAX, DEFAULT_SMALL_CEILING, RetryPolicy, TransferLimits,
    WriteMode,
};
use serde::{Deserialize, Serialize};

/// Bot configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Objects up to this size are uploaded in one request.
    #[serde(default = "default_small_ceiling")]
    pub small_ceiling: u64,

    /// Objects above this size are refused.
    #[serde(default = "default_hard_max")]
    pub hard_max: u64,

    /// Session upload chunk size in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Dropbox folder files are written into.
    #[serde(default = "default_destination_root")]
    pub destination_root: String,

    /// Whole-transfer tries, including the first.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: u64,

    /// Replace existing files instead of failing on conflict.
    #[serde(default = "default_true")]
    pub overwrite: bool,

    /// Bot API base URL; point it at a local Bot API server to lift the
    /// 20 MB download limit of the public one.
    #[serde(default)]
    pub telegram_api_base: Option<String>,

    /// Long-poll timeout for `getUpdates`.
    #[serde(default = "default_poll_timeout_seconds")]
    pub poll_timeout_seconds: u64,

    /// Minimum spacing between progress edits.
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    /// Transfers running at once across all chats; further files wait.
    #[serde(default = "default_max_concurrent_transfers")]
    pub max_concurrent_transfers: usize,
}

fn default_small_ceiling() -> u64 {
    DEFAULT_SMALL_CEILING
}

fn default_hard_max() -> u64 {
    DEFAULT_HARD_MAX
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_destination_root() -> String {
    "/".into()
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_seconds() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

fn default_poll_timeout_seconds() -> u64 {
    30
}

fn default_progress_interval_ms() -> u64 {
    1000
}

fn default_max_concurrent_transfers() -> usize {
    4
}

impl Default for Config {
    fn default() -> Self {
        Self {
            small_ceiling: default_small_ceiling(),
            hard_max: default_hard_max(),
            chunk_size: default_chunk_size(),
            destination_root: default_destination_root(),
            retry_attempts: default_retry_attempts(),
            retry_delay_seconds: default_retry_delay_seconds(),
            overwrite: default_true(),
            telegram_api_base: None,
            poll_timeout_seconds: default_poll_timeout_seconds(),
            progress_interval_ms: default_progress_interval_ms(),
            max_concurrent_transfers: default_max_concurrent_transfers(),
        }
    }
}

impl Config {
    /// Loads the file, applies environment overrides and validates.
    pub fn load() -> anyhow::Result<Self> {
        let lookup = |key: &str| std::env::var(key).ok();
        let path = config_path(lookup);
        let mut config = Self::load_from(&path)?;
        config.apply_env(lookup)?;
        config.limits()?;
        if config.max_concurrent_transfers == 0 {
            bail!("max_concurrent_transfers must be at least 1");
        }
        tracing::debug!(path = %path.display(), "configuration resolved");
        Ok(config)
    }

    /// Reads `path`, falling back to defaults when it does not exist.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Applies `DROPFERRY_*` overrides returned by `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(v) = lookup("DROPFERRY_SMALL_CEILING") {
            self.small_ceiling = parse_env("DROPFERRY_SMALL_CEILING", &v)?;
        }
        if let Some(v) = lookup("DROPFERRY_HARD_MAX") {
            self.hard_max = parse_env("DROPFERRY_HARD_MAX", &v)?;
        }
        if let Some(v) = lookup("DROPFERRY_CHUNK_SIZE") {
            self.chunk_size = parse_env("DROPFERRY_CHUNK_SIZE", &v)?;
        }
        if let Some(v) = lookup("DROPFERRY_DESTINATION_ROOT") {
            self.destination_root = v;
        }
        if let Some(v) = lookup("DROPFERRY_RETRY_ATTEMPTS") {
            self.retry_attempts = parse_env("DROPFERRY_RETRY_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("DROPFERRY_RETRY_DELAY_SECONDS") {
            self.retry_delay_seconds = parse_env("DROPFERRY_RETRY_DELAY_SECONDS", &v)?;
        }
        if let Some(v) = lookup("DROPFERRY_OVERWRITE") {
            self.overwrite = parse_bool("DROPFERRY_OVERWRITE", &v)?;
        }
        if let Some(v) = lookup("DROPFERRY_TELEGRAM_API_BASE") {
            self.telegram_api_base = (!v.trim().is_empty()).then_some(v);
        }
        Ok(())
    }

    /// Validated transfer limits.
    ///
    /// Inline uploads and session chunks are single Dropbox requests, so
    /// both must fit in [`MAX_REQUEST_BYTES`].
    pub fn limits(&self) -> anyhow::Result<TransferLimits> {
        let limits = TransferLimits::new(self.small_ceiling, self.hard_max, self.chunk_size)
            .context("invalid transfer limits")?;
        if limits.small_ceiling > MAX_REQUEST_BYTES {
            bail!(
                "small_ceiling {} exceeds the Dropbox request limit of {MAX_REQUEST_BYTES} bytes",
                limits.small_ceiling
            );
        }
        if limits.chunk_size as u64 > MAX_REQUEST_BYTES {
            bail!(
                "chunk_size {} exceeds the Dropbox request limit of {MAX_REQUEST_BYTES} bytes",
                limits.chunk_size
            );
        }
        Ok(limits)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_secs(self.retry_delay_seconds),
        )
    }

    pub fn write_mode(&self) -> WriteMode {
        if self.overwrite {
            WriteMode::Overwrite
        } else {
            WriteMode::Add
        }
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

/// Credentials, taken from the environment only.
pub struct Secrets {
    pub bot_token: String,
    pub dropbox_token_url: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets").finish_non_exhaustive()
    }
}

impl Secrets {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let required = |key: &str| match lookup(key) {
            Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
            _ => bail!("{key} environment variable is required"),
        };
        Ok(Self {
            bot_token: required("TELEGRAM_BOT_TOKEN")?,
            dropbox_token_url: required("DROPBOX_TOKEN_URL")?,
        })
    }
}

fn parse_env<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid value for {key}: {value:?}"))
}

fn parse_bool(key: &str, value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("invalid value for {key}: {value:?}"),
    }
}

/// Returns the configuration file path.
fn config_path(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(path) = lookup("DROPFERRY_CONFIG") {
        return PathBuf::from(path);
    }
    let home = lookup("HOME").unwrap_or_else(|| "/tmp".into());
    PathBuf::from(home)
        .join(".config")
        .join("dropferry")
        .join("bot.toml")
}
