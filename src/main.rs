//! CLI entry point for the swap watcher.
//!
//! ```text
//! main.rs        → parse CLI, initialize tracing
//!     ↓
//! cli::run       → load config, bootstrap context
//!     ↓
//! pipeline       → decode → resolve → emit
//!     ↓
//! api::server    → WebSocket / SSE / JSON
//! ```

use clap::Parser;
use tracing::error;
use ton_swap_watcher::{cli, observability};

/// Entry point.
///
/// Logging is controlled by `RUST_LOG` (or `--log-level`), `LOG_JSON` and
/// `LOG_FILE`.
#[tokio::main]
async fn main() {
    let args = cli::Cli::parse();

    let log_file = std::env::var("LOG_FILE").ok().map(std::path::PathBuf::from);
    let json_output = std::env::var("LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    // Held until exit so the file writer flushes
    let _log_guard = match observability::init_tracing(args.log_level.clone(), log_file, json_output) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize tracing: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = cli::run(args).await {
        error!(error = %e, "Application error");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
