//! Command-line interface for the swap watcher.
//!
//! # Commands
//!
//! - `watch`: stream swaps from the router, log them and serve them over
//!   WebSocket/SSE
//! - `price`: price the native asset (and optionally some pools) once
//!
//! # Example
//!
//! ```bash
//! # Watch with long lines and the server on port 8080
//! ton-swap-watcher --log-level debug watch --display long-pretty --port 8080
//!
//! # One-shot price of pTON and of the tokens in one pool
//! ton-swap-watcher price --pool EQ...
//! ```

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::address::Address;
use crate::api::server::run_server;
use crate::app_state::AppState;
use crate::config::Config;
use crate::error::{TrackerError, TrackerResult};
use crate::pipeline::{self, Context, DisplayFormat, Pipeline, PipelineOptions, StatsSnapshot};
use crate::pricing::FixedPrice;

/// STON.fi swap watcher for TON
#[derive(Parser, Debug)]
#[command(name = "ton-swap-watcher")]
#[command(about = "Realtime STON.fi swap watcher with jetton resolution and live prices", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Log level or filter directive, used when RUST_LOG is unset
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream swaps in real time
    Watch {
        /// How swaps are rendered in the log
        #[arg(short, long, value_enum, default_value_t = DisplayFormat::Pretty)]
        display: DisplayFormat,

        /// Broadcast server bind address
        #[arg(long, default_value = "127.0.0.1")]
        host: IpAddr,

        /// Broadcast server port
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },

    /// Print current prices once
    Price {
        /// Pools to load before printing (repeatable)
        #[arg(long = "pool", value_parser = Address::from_str)]
        pools: Vec<Address>,
    },
}

/// Execute the parsed command.
///
/// # Errors
///
/// Returns an error if configuration loading or startup fails.
pub async fn run(cli: Cli) -> TrackerResult<()> {
    match cli.command {
        Commands::Watch {
            display,
            host,
            port,
        } => run_watch_command(display, SocketAddr::new(host, port)).await,
        Commands::Price { pools } => run_price_command(&pools).await,
    }
}

/// Execute the watch command.
async fn run_watch_command(display: DisplayFormat, addr: SocketAddr) -> TrackerResult<()> {
    let config = Config::from_env()?;
    let ctx = Context::bootstrap(&config).await?;

    let account = ctx
        .chain
        .account_state(config.dex_address())
        .await
        .map_err(|e| TrackerError::startup("cannot read router account", Some(Box::new(e))))?;
    if !account.active {
        warn!(router = %config.dex_address(), "Router account is not active");
    }
    let transactions = ctx
        .chain
        .subscribe_transactions(config.dex_address(), account.last_lt)
        .await
        .map_err(|e| TrackerError::startup("cannot subscribe to router", Some(Box::new(e))))?;

    let state = AppState::new(ctx.pools.clone(), ctx.stats.clone());
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let emitter = tokio::spawn(pipeline::emit(event_rx, display, state.swap_broadcast.clone()));
    let server = tokio::spawn(async move {
        if let Err(e) = run_server(state, addr).await {
            error!(error = %e, "Broadcast server stopped");
        }
    });

    println!(
        "{} {}",
        "🔍 Watching STON.fi swaps on".cyan().bold(),
        config.dex_address().to_string().yellow()
    );
    println!(
        "{} ws://{addr}/api/v1/stream  http://{addr}/api/v1/events",
        "📡 Streaming CSV records at".cyan()
    );
    info!(router = %config.dex_address(), from_lt = account.last_lt, %addr, "Watch started");

    let pipeline = Pipeline::new(ctx, PipelineOptions::from(&config));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    tokio::select! {
        stats = pipeline.run(transactions, event_tx) => {
            warn!("Transaction stream ended");
            print_summary(&stats);
        }
        _ = &mut shutdown => {
            info!("Shutdown signal received");
            println!();
            println!("{}", "🛑 Shutting down...".yellow().bold());
            print_summary(&pipeline.context().stats.snapshot());
        }
    }

    server.abort();
    // Ends once every event sender has been dropped.
    match emitter.await {
        Ok(rendered) => info!(rendered, "Emitter drained"),
        Err(e) => error!(error = %e, "Emitter task failed"),
    }
    println!("{}", "👋 Shutdown complete".green().bold());
    Ok(())
}

/// Execute the price command.
async fn run_price_command(pools: &[Address]) -> TrackerResult<()> {
    let config = Config::from_env()?;
    let ctx = Context::bootstrap(&config).await?;

    let native = ctx.pools.refresh_anchor().await?;
    info!(%native, "Native price fetched");

    for pool in pools {
        match ctx.pools.get_or_create(pool).await {
            Ok(snapshot) => info!(
                pool = %pool,
                symbol = snapshot.pool.lp_symbol().unwrap_or("unknown"),
                "Pool loaded"
            ),
            Err(e) => {
                warn!(pool = %pool, error = %e, "Pool unavailable");
                println!("{} {} {}", "⚠️ ".red(), pool.short(), e.to_string().red());
            }
        }
    }

    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    println!("{} {}", "📊".cyan(), timestamp.to_string().dimmed());
    for (symbol, price) in ctx.pools.prices().await {
        print_price(&symbol, price);
    }
    Ok(())
}

fn print_price(symbol: &str, price: FixedPrice) {
    println!("  {:<16} {}", symbol.bold(), format!("${price}").green().bold());
}

fn print_summary(stats: &StatsSnapshot) {
    println!(
        "{} received {} | swaps {} | emitted {} | failed {}",
        "📍".cyan(),
        stats.received.to_string().yellow(),
        stats.accepted.to_string().blue(),
        stats.emitted.to_string().green(),
        stats.failed.to_string().red()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        assert!(Cli::try_parse_from(["ton-swap-watcher", "watch"]).is_ok());
        assert!(Cli::try_parse_from(["ton-swap-watcher", "price"]).is_ok());
        assert!(Cli::try_parse_from(["ton-swap-watcher", "index"]).is_err());
    }

    #[test]
    fn test_watch_options() {
        let cli = Cli::try_parse_from([
            "ton-swap-watcher",
            "watch",
            "--display",
            "long-pretty",
            "--host",
            "0.0.0.0",
            "--port",
            "8080",
            "--log-level",
            "debug",
        ]);
        assert!(cli.is_ok());
        if let Ok(Cli {
            log_level,
            command: Commands::Watch { display, host, port },
        }) = cli
        {
            assert_eq!(display, DisplayFormat::LongPretty);
            assert_eq!(host.to_string(), "0.0.0.0");
            assert_eq!(port, 8080);
            assert_eq!(log_level.as_deref(), Some("debug"));
        }
    }

    #[test]
    fn test_price_pools_are_validated() {
        let ok = Cli::try_parse_from([
            "ton-swap-watcher",
            "price",
            "--pool",
            "EQAKleHU6-eGDQUfi4YXMNve4UQP0RGAIRkU4AiRRlgDUbaM",
        ]);
        assert!(matches!(
            ok,
            Ok(Cli { command: Commands::Price { ref pools }, .. }) if pools.len() == 1
        ));
        assert!(Cli::try_parse_from(["ton-swap-watcher", "price", "--pool", "nope"]).is_err());
    }
}
