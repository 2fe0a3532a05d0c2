//! Logging setup for Pluto binaries.
//!
//! Console output is human-readable with uptime stamps. When a log directory
//! is configured a JSON copy goes to `pluto.log` there as well. `RUST_LOG`
//! overrides the configured filter.

use std::fs::File;
use std::path::{Path, PathBuf};

use pluto_config::DebugConfig;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when the settings leave `log_level` empty.
pub const DEFAULT_FILTER: &str = "info";

/// Name of the JSON log file.
pub const LOG_FILE: &str = "pluto.log";

/// Installs the global subscriber.
///
/// Calling this twice panics inside `tracing_subscriber`, so binaries call it
/// once at startup.
pub fn init_logging(debug: &DebugConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(debug)));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if let Some(dir) = &debug.log_dir
        && let Some(file) = open_log_file(dir)
    {
        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();
        subscriber.with(file_layer).init();
        return;
    }

    subscriber.init();
}

/// The filter string that applies when `RUST_LOG` is unset.
pub fn filter_directive(debug: &DebugConfig) -> &str {
    match debug.log_level.trim() {
        "" => DEFAULT_FILTER,
        level => level,
    }
}

/// The default filter as an [`EnvFilter`].
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}

/// Where the JSON log goes for a given directory.
pub fn log_file_path(dir: &Path) -> PathBuf {
    dir.join(LOG_FILE)
}

fn open_log_file(dir: &Path) -> Option<File> {
    std::fs::create_dir_all(dir).ok()?;
    File::create(log_file_path(dir)).ok()
}
