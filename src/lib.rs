//! # TON Swap Watcher
//!
//! Realtime watcher for STON.fi swaps on TON. Every transaction on the
//! router is filtered and decoded; matching swaps are enriched with jetton
//! and pool metadata, priced in USD and emitted as one record per swap.
//!
//! ## Architecture
//!
//! Leaf-first:
//!
//! 1. **Cells** ([`cell`], [`address`]) - bit cursor, BOC, dictionaries, addresses
//! 2. **Chain access** ([`chain`]) - `ChainClient` trait and the toncenter client
//! 3. **Jettons** ([`jetton`]) - wallet → master resolution, TEP-64 content, metadata
//! 4. **Pools** ([`pool`]) - `get_pool_data`, pool cache
//! 5. **Pricing** ([`pricing`]) - exact cross-rate derivation anchored on jUSDT/pTON
//! 6. **Swaps** ([`swap`]) - filter, decoder, event rendering
//! 7. **Pipeline** ([`pipeline`]) - bounded concurrent resolution and emission
//! 8. **Server** ([`api`]) - WebSocket/SSE broadcast plus JSON endpoints
//!
//! ## Quick Start
//!
//! ```bash
//! # Stream swaps
//! ton-swap-watcher watch
//!
//! # Print prices once
//! ton-swap-watcher price
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`error::TrackerResult<T>`](error::TrackerResult):
//!
//! ```rust
//! use ton_swap_watcher::error::{TrackerError, TrackerResult};
//!
//! fn example() -> TrackerResult<()> {
//!     Err(TrackerError::price_not_found("SCALE"))
//! }
//! assert!(example().is_err());
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod address;
pub mod api;
pub mod app_state;
pub mod cell;
pub mod chain;
pub mod cli;
pub mod config;
pub mod error;
pub mod jetton;
pub mod observability;
pub mod pipeline;
pub mod pool;
pub mod pricing;
pub mod swap;
