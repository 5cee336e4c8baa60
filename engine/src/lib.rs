//! subburn Core Library
//!
//! Subtitle styling, rendering, translation and burn-in.
//! `core` holds the components; `api` is the request/response surface the
//! CLI (and any other transport) drives.

pub mod api;
pub mod core;

use std::path::Path;
use std::sync::OnceLock;

/// Log file prefix inside the log directory
pub const LOG_FILE_NAME: &str = "subburn.log";

static LOGGING: OnceLock<Option<tracing_appender::non_blocking::WorkerGuard>> = OnceLock::new();

/// Installs the global tracing subscriber.
///
/// `level` is a level or an `EnvFilter` directive; `RUST_LOG` style
/// directives that fail to parse fall back to `info`. Logs go to stderr and,
/// when `log_dir` is given, to a daily rolling file. Calling this again is a
/// no-op.
pub fn init_logging(log_dir: Option<&Path>, level: &str) {
    LOGGING.get_or_init(|| {
        use std::io::IsTerminal;
        use tracing_subscriber::prelude::*;

        let env_filter = tracing_subscriber::EnvFilter::try_new(level)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

        let console_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(std::io::stderr().is_terminal());

        let mut guard = None;
        let file_layer = log_dir.and_then(|dir| {
            if let Err(e) = std::fs::create_dir_all(dir) {
                eprintln!("Failed to create log directory {}: {}", dir.display(), e);
                return None;
            }
            let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
            guard = Some(worker_guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false),
            )
        });

        let subscriber = tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer);

        // Another subscriber may already be installed (tests, embedding apps).
        let _ = tracing::subscriber::set_global_default(subscriber);
        guard
    });
}
