#![allow(dead_code)]

use std::path::Path;

use anyhow::Result;
use once_cell::sync::OnceCell;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub mod filesystem;
pub mod history;

pub use filesystem::{write_atomic, FileSystem, RealFileSystem, VirtualFileSystem};
pub use history::HistoryLog;

const DAY_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Guard for the non-blocking file writer so it is not dropped early.
static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
/// Ensures logging is only initialized once.
static LOG_INIT: OnceCell<()> = OnceCell::new();

/// Initialize tracing-based logging with console output and, when enabled,
/// a daily-rolling file under `log_dir` named `app.YYYY-MM-DD.log`.
///
/// Subsequent calls are no-ops so every binary can call this helper
/// confidently and share the same configuration.
pub fn init_logging(log_dir: &Path, save_to_file: bool) -> Result<()> {
    LOG_INIT
        .get_or_try_init(|| configure_logging(log_dir, save_to_file))
        .map(|_| ())
}

fn configure_logging(log_dir: &Path, save_to_file: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = fmt::layer().with_writer(std::io::stdout);

    if save_to_file {
        let _ = std::fs::create_dir_all(log_dir);
        let file_appender = tracing_appender::rolling::daily(log_dir, "app");
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

        // Keep guard alive for the process lifetime.
        let _ = FILE_GUARD.set(guard);

        let file_layer = fmt::layer().with_ansi(false).with_writer(file_writer);
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .try_init()?;
    }

    Ok(())
}

/// Current UTC date as `YYYY-MM-DD`, the format used for day rollover and
/// per-day file names.
pub fn today_utc() -> String {
    OffsetDateTime::now_utc()
        .format(DAY_FORMAT)
        .unwrap_or_else(|_| "1970-01-01".to_string())
}

/// Current UTC time as an RFC3339 string for history records.
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Current unix time in whole seconds.
pub fn unix_seconds() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}
