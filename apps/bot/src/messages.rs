//! User-facing message text.

use std::time::Duration;

use dropferry_transfer::{FailureKind, ProgressEvent, Strategy, TransferLimits, TransferResult};

/// Formats a byte count as `B`, `KB`, `MB` or `GB` with one decimal.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".into();
    }
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.1} {}", UNITS[unit])
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    match secs {
        0..60 => format!("{secs}s"),
        60..3600 => format!("{}m {:02}s", secs / 60, secs % 60),
        _ => format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60),
    }
}

pub fn welcome(limits: &TransferLimits) -> String {
    format!(
        "🤖 Large File Upload Bot\n\n\
         I upload the files you send me to Dropbox, up to {max}.\n\n\
         📁 How it works:\n\
         • Files ≤ {small}: uploaded in one request\n\
         • Larger files: streamed in {chunk} chunks\n\n\
         🚀 Just send me any file and I'll handle the rest!",
        max = format_file_size(limits.hard_max),
        small = format_file_size(limits.small_ceiling),
        chunk = format_file_size(limits.chunk_size as u64),
    )
}

pub fn help(limits: &TransferLimits) -> String {
    format!(
        "🆘 Help & Commands\n\n\
         /start - Start the bot\n\
         /help - Show this help message\n\
         /status - Check bot status\n\
         /cancel - Stop your running uploads\n\n\
         Send any document, photo, video or audio file (up to {max}) and it \
         is saved to Dropbox. You'll get a confirmation with the file details.\n\n\
         If an upload fails, try again in a few minutes. Large files take \
         longer to process.",
        max = format_file_size(limits.hard_max),
    )
}

/// `/status` text. `dropbox` is the account email, or the error that
/// prevented reaching Dropbox.
pub fn status(
    dropbox: Result<&str, &str>,
    limits: &TransferLimits,
    destination_root: &str,
    active: usize,
) -> String {
    let dropbox = match dropbox {
        Ok(email) => format!("✅ Connected ({email})"),
        Err(e) => format!("❌ Not connected ({e})"),
    };
    format!(
        "🔧 Bot Status\n\n\
         Telegram Bot: ✅ Running\n\
         Dropbox: {dropbox}\n\
         Active uploads: {active}\n\n\
         File Limits:\n\
         • Single request: ≤ {small}\n\
         • Chunk size: {chunk}\n\
         • Maximum size: {max}\n\
         • Destination: {destination_root}",
        small = format_file_size(limits.small_ceiling),
        chunk = format_file_size(limits.chunk_size as u64),
        max = format_file_size(limits.hard_max),
    )
}

pub fn processing(name: &str, kind: &str, size: u64) -> String {
    format!(
        "📁 Processing {kind}: {name}\n📊 Size: {}\n⏳ Please wait...",
        format_file_size(size)
    )
}

pub fn progress(name: &str, event: &ProgressEvent, speed: f64, eta: Option<Duration>) -> String {
    let percent = event
        .percent()
        .map(|p| format!("{p:.1}%"))
        .unwrap_or_else(|| "?".into());
    let mut text = format!(
        "📤 Uploading large file...\n📁 File: {name}\n📊 Progress: {percent} ({} of {})\n📦 Chunk: {}",
        format_file_size(event.bytes_transferred),
        format_file_size(event.total_bytes),
        event.chunk_index,
    );
    if speed > 0.0 {
        text.push_str(&format!("\n⚡ Speed: {}/s", format_file_size(speed as u64)));
    }
    if let Some(eta) = eta {
        text.push_str(&format!("\n⏱ Remaining: {}", format_duration(eta)));
    }
    text
}

/// Final status text for a transfer.
pub fn result(name: &str, size: u64, result: &TransferResult, limits: &TransferLimits) -> String {
    if result.succeeded {
        let location = result
            .stored
            .as_ref()
            .map(|s| s.path.as_str())
            .unwrap_or(name);
        let method = match result.strategy_used {
            Some(Strategy::Inline) => "single request",
            Some(Strategy::Chunked) => "upload session",
            None => "unknown",
        };
        return format!(
            "✅ Upload successful!\n📁 File: {name}\n📊 Size: {}\n🗂️ Location: {location}\n📝 Method: {method}",
            format_file_size(result.bytes_transferred),
        );
    }

    match result.failure_reason {
        Some(FailureKind::ObjectTooLarge) => format!(
            "❌ File too large!\n📁 File: {name}\n📊 Size: {}\n⚠️ Maximum supported size: {}",
            format_file_size(size),
            format_file_size(limits.hard_max),
        ),
        Some(FailureKind::Cancelled) => format!("🛑 Upload cancelled\n📁 File: {name}"),
        Some(FailureKind::SourceUnavailable) if !result.retryable => format!(
            "❌ Upload failed!\n📁 File: {name}\n⚠️ Telegram will not serve this file: {}",
            result.error.as_deref().unwrap_or("unknown error"),
        ),
        Some(FailureKind::InvalidDestination) => format!(
            "❌ Upload failed!\n📁 File: {name}\n⚠️ The file name cannot be used as a Dropbox path"
        ),
        _ => {
            let tries = if result.attempts > 1 {
                format!(" after {} attempts", result.attempts)
            } else {
                String::new()
            };
            format!(
                "❌ Upload failed{tries}!\n📁 File: {name}\n📊 Size: {}\n🔄 Please try again later",
                format_file_size(size),
            )
        }
    }
}

pub fn cancelled(count: usize) -> String {
    match count {
        0 => "Nothing to cancel.".into(),
        1 => "🛑 Cancelling your upload...".into(),
        n => format!("🛑 Cancelling your {n} uploads..."),
    }
}
