//! Structured logging setup, the idiomatic-Rust counterpart to the
//! source's `ply-logger.c` timestamped/verbose log sink (spec §1, "shared
//! utility libraries" — ambient concern, carried regardless of the
//! Non-goals that scope *features* out).

use std::path::Path;

use tracing_subscriber::EnvFilter;

/// Where daemon log output goes, controlled by `--debug`/`--debug-file`.
pub enum LogSink<'a> {
    /// No debug logging; only `tracing`'s default (stderr, warn-and-above).
    Quiet,
    /// Verbose logging to stderr.
    Stderr,
    /// Verbose logging to a file, non-blocking via `tracing-appender`.
    File(&'a Path),
}

/// A guard that must be kept alive for the lifetime of the process when a
/// file sink is installed; dropping it flushes the non-blocking writer.
pub struct LoggingGuard(Option<tracing_appender::non_blocking::WorkerGuard>);

/// Install the global `tracing` subscriber. Call once, at process start,
/// before any other crate's log output could be emitted.
pub fn init(sink: LogSink<'_>) -> LoggingGuard {
    let filter = EnvFilter::try_from_env("PLYMOUTHD_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_filter(&sink)));

    match sink {
        LogSink::Quiet => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .try_init();
            LoggingGuard(None)
        }
        LogSink::Stderr => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_writer(std::io::stderr)
                .try_init();
            LoggingGuard(None)
        }
        LogSink::File(path) => {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "plymouthd.log".to_string());
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_ansi(false)
                .with_writer(writer)
                .try_init();
            LoggingGuard(Some(guard))
        }
    }
}

fn default_filter(sink: &LogSink<'_>) -> &'static str {
    match sink {
        LogSink::Quiet => "warn",
        LogSink::Stderr | LogSink::File(_) => "debug",
    }
}
