use std::sync::OnceLock;

use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{runtime_dir, LogLevel};

static INIT: OnceLock<()> = OnceLock::new();

pub const LOG_FILE_PREFIX: &str = "tangle";
const MAX_LOG_FILES: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// Daily rotated files in the runtime directory (background node).
    File,
    /// Commands talking to the node.
    Stderr,
    /// Foreground node.
    Both,
}

/// Keeps the non-blocking file writer alive; drop flushes pending lines.
pub struct LogGuard {
    _guard: Option<WorkerGuard>,
}

pub fn init(level: LogLevel, mode: LogMode, cli_override: Option<LogLevel>) -> LogGuard {
    let mut guard = None;

    INIT.get_or_init(|| {
        let Some(level) = cli_override.unwrap_or(level).as_tracing_level() else {
            return;
        };

        let stderr = matches!(mode, LogMode::Stderr | LogMode::Both).then(|| {
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_timer(UtcTime::rfc_3339())
                .with_ansi(true)
                .with_target(true)
                .with_filter(env_filter(level))
        });

        let file = match mode {
            LogMode::File | LogMode::Both => file_writer().map(|(writer, file_guard)| {
                guard = Some(file_guard);
                fmt::layer()
                    .with_writer(writer)
                    .with_timer(UtcTime::rfc_3339())
                    .with_ansi(false)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_filter(env_filter(level))
            }),
            LogMode::Stderr => None,
        };

        tracing_subscriber::registry().with(stderr).with(file).init();
    });

    LogGuard { _guard: guard }
}

fn env_filter(level: Level) -> EnvFilter {
    let mut filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    for quiet in ["rusqlite=warn", "mio=warn"] {
        if let Ok(directive) = quiet.parse() {
            filter = filter.add_directive(directive);
        }
    }

    filter
}

fn file_writer() -> Option<(NonBlocking, WorkerGuard)> {
    let log_dir = runtime_dir();

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!(
            "Warning: Failed to create log directory {:?}: {}",
            log_dir, e
        );
        return None;
    }

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(&log_dir)
        .ok()?;

    Some(tracing_appender::non_blocking(appender))
}
