//! Structured logging setup (§1.1 of the expanded requirements): console
//! output via `tracing_subscriber::fmt`, plus a rolling log file under the
//! user config dir via `tracing-appender`, the same pairing `naive-client`
//! and `oxidized` both reach for.

use std::path::Path;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. The returned guard must be held for the
/// process lifetime — dropping it stops the background writer thread
/// before buffered log lines reach the file.
pub fn init(config_dir: &Path, verbose: bool) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = config_dir.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "openzone.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let console_layer = tracing_subscriber::fmt::layer();
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}
