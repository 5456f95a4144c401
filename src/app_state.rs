//! Shared application state for the broadcast server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::broadcast;

use crate::pipeline::Stats;
use crate::pool::PoolCache;

/// Capacity of the CSV broadcast channel; slow subscribers skip ahead.
pub const BROADCAST_CAPACITY: usize = 1024;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct AppState {
    /// Pools and prices
    pub pools: Arc<PoolCache>,
    /// Pipeline counters
    pub stats: Arc<Stats>,
    /// Application start time for uptime tracking
    pub start_time: SystemTime,
    /// One CSV record per emitted swap
    pub swap_broadcast: broadcast::Sender<String>,
    /// Open WebSocket and SSE streams
    pub subscribers: Arc<AtomicUsize>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("start_time", &self.start_time)
            .field("subscribers", &self.subscribers.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create state around the pipeline's pool cache and counters.
    #[must_use]
    pub fn new(pools: Arc<PoolCache>, stats: Arc<Stats>) -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);

        Self {
            pools,
            stats,
            start_time: SystemTime::now(),
            swap_broadcast: tx,
            subscribers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Register a stream subscriber; the guard unregisters on drop.
    #[must_use]
    pub fn subscribe(&self) -> (broadcast::Receiver<String>, SubscriberGuard) {
        self.subscribers.fetch_add(1, Ordering::Relaxed);
        (
            self.swap_broadcast.subscribe(),
            SubscriberGuard(Arc::clone(&self.subscribers)),
        )
    }

    /// Number of open streams.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::Relaxed)
    }
}

/// Decrements the subscriber count when dropped.
#[derive(Debug)]
pub struct SubscriberGuard(Arc<AtomicUsize>);

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}
