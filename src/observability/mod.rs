//! Structured logging setup.
//!
//! # Usage
//!
//! ```no_run
//! use ton_swap_watcher::observability;
//!
//! // Pretty console output at the default level; keep the guard alive
//! let _guard = observability::init_tracing(None, None, false)?;
//! # Ok::<(), ton_swap_watcher::error::TrackerError>(())
//! ```
//!
//! # Environment Configuration
//!
//! ```bash
//! # Component-specific levels
//! RUST_LOG=ton_swap_watcher::pool=debug,ton_swap_watcher=info,warn ton-swap-watcher watch
//!
//! # JSON console output
//! LOG_JSON=true ton-swap-watcher watch
//!
//! # Also write JSON logs to a daily-rotated file
//! LOG_FILE=./logs/watcher.log ton-swap-watcher watch
//! ```

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::error::{TrackerError, TrackerResult};

/// Filter used when neither `RUST_LOG` nor a level is given.
pub const DEFAULT_FILTER: &str = "ton_swap_watcher=info,warn";

/// Pick the filter directive: `RUST_LOG`, then `log_level`, then
/// [`DEFAULT_FILTER`].
#[must_use]
pub fn filter_directive(rust_log: Option<String>, log_level: Option<String>) -> String {
    rust_log
        .filter(|f| !f.trim().is_empty())
        .or(log_level)
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

/// Initialize the global tracing subscriber.
///
/// * `log_level` - level or directive used when `RUST_LOG` is unset
/// * `log_file` - optional path; enables a daily-rotated JSON file layer
/// * `json_output` - JSON console output instead of pretty
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the process.
///
/// # Errors
///
/// Returns a startup error if the log directory cannot be created or a
/// subscriber is already installed.
pub fn init_tracing(
    log_level: Option<String>,
    log_file: Option<PathBuf>,
    json_output: bool,
) -> TrackerResult<Option<WorkerGuard>> {
    let directive = filter_directive(std::env::var("RUST_LOG").ok(), log_level);
    let env_filter = EnvFilter::try_new(&directive).map_err(|e| {
        TrackerError::startup(format!("invalid log filter '{directive}'"), Some(Box::new(e)))
    })?;

    let console_layer = if json_output {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer().with_target(true).with_thread_ids(true).boxed()
    };

    let (file_layer, guard) = match log_file.as_deref() {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir).map_err(|e| {
                TrackerError::startup(format!("cannot create log directory {}", dir.display()), Some(Box::new(e)))
            })?;
            let appender = tracing_appender::rolling::daily(
                dir,
                path.file_name().unwrap_or_else(|| OsStr::new("watcher.log")),
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_current_span(true)
                .with_target(true)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| TrackerError::startup("tracing already initialized", Some(Box::new(e))))?;

    info!(filter = %directive, json_output, file_logging = log_file.is_some(), "Tracing initialized");
    Ok(guard)
}
