use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Directory holding the rolling JSON log files
pub const LOG_DIR: &str = "logs";

/// Initializes logging with console output and a daily rolling JSON file in `logs/`.
///
/// `RUST_LOG` extends the default `loan_sync=info` filter. Keep the returned guard alive
/// for the life of the process so buffered file logs are flushed on exit.
pub fn init_logging() -> WorkerGuard {
    let _ = fs::create_dir_all(LOG_DIR);

    let file_appender = tracing_appender::rolling::daily(LOG_DIR, "loan_sync.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);
    let console_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "loan_sync=info".parse() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    guard
}
