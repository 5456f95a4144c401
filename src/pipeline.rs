//! Transaction ingest loop.
//!
//! ```text
//! subscription ──► decode (inline) ──reject──► debug log
//!                      │accept
//!                      ▼
//!               JoinSet unit (semaphore, timeout)
//!               resolve source issuer + pool
//!                      │
//!                      ▼
//!               event channel ──► emitter ──► log + broadcast (CSV)
//! ```
//!
//! Every unit is isolated: a failure, timeout or panic in one resolution
//! never stops the loop or touches other units. The anchor price is
//! refreshed on a timer by a separate task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::address::Address;
use crate::chain::{ChainClient, TonCenterClient, Transaction};
use crate::config::Config;
use crate::error::{TrackerError, TrackerResult};
use crate::jetton::{HttpMetadataFetcher, JettonResolver, MetadataFetcher};
use crate::pool::PoolCache;
use crate::swap::{self, Decision, DecodedSwap, SwapEvent};

/// Period of the throughput log line.
pub const THROUGHPUT_INTERVAL: Duration = Duration::from_secs(10);

/// How emitted events are rendered in the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum DisplayFormat {
    /// One line with amounts, reserves and prices
    #[default]
    Pretty,
    /// One line with trader and pool addresses
    LongPretty,
    /// Every field, one per line
    Verbose,
}

impl DisplayFormat {
    /// Render `event` in this format.
    #[must_use]
    pub fn render(self, event: &SwapEvent) -> String {
        match self {
            Self::Pretty => event.pretty(),
            Self::LongPretty => event.long_pretty(),
            Self::Verbose => event.verbose(),
        }
    }
}

/// Pipeline counters.
#[derive(Debug, Default)]
pub struct Stats {
    received: AtomicU64,
    rejected: AtomicU64,
    accepted: AtomicU64,
    emitted: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`Stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Transactions received from the subscription
    pub received: u64,
    /// Transactions that are not swaps
    pub rejected: u64,
    /// Swaps decoded and handed to a unit
    pub accepted: u64,
    /// Events sent to the emitter
    pub emitted: u64,
    /// Decode failures, unit failures, timeouts and panics
    pub failed: u64,
}

impl Stats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Everything a resolution unit needs. Cheap to clone.
#[derive(Clone)]
pub struct Context {
    /// Chain access
    pub chain: Arc<dyn ChainClient>,
    /// Wallet → issuer resolution
    pub resolver: Arc<JettonResolver>,
    /// Pools and prices
    pub pools: Arc<PoolCache>,
    /// Counters
    pub stats: Arc<Stats>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("resolver", &self.resolver)
            .field("pools", &self.pools)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Wire a context from its collaborators.
    #[must_use]
    pub fn new(
        chain: Arc<dyn ChainClient>,
        fetcher: Arc<dyn MetadataFetcher>,
        anchor: Address,
    ) -> Self {
        let resolver = Arc::new(JettonResolver::new(Arc::clone(&chain), fetcher));
        let pools = Arc::new(PoolCache::new(Arc::clone(&chain), Arc::clone(&resolver), anchor));
        Self {
            chain,
            resolver,
            pools,
            stats: Arc::new(Stats::default()),
        }
    }

    /// Build the production context and check the chain is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::StartupError`] if the clients cannot be built
    /// or toncenter does not answer.
    pub async fn bootstrap(config: &Config) -> TrackerResult<Self> {
        let chain = TonCenterClient::new(
            config.toncenter_url(),
            config.api_key().map(str::to_string),
            config.poll_interval(),
        )
        .map_err(|e| TrackerError::startup("cannot build toncenter client", Some(Box::new(e))))?;
        let fetcher = HttpMetadataFetcher::new()
            .map_err(|e| TrackerError::startup("cannot build metadata client", Some(Box::new(e))))?;

        let block = chain
            .head_block()
            .await
            .map_err(|e| TrackerError::startup("toncenter unreachable", Some(Box::new(e))))?;
        info!(seqno = block.seqno, url = config.toncenter_url(), "Connected to toncenter");

        Ok(Self::new(Arc::new(chain), Arc::new(fetcher), *config.anchor_pool()))
    }
}

/// Loop tuning.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// Concurrent units, `None` = unbounded
    pub max_in_flight: Option<usize>,
    /// Per-unit timeout, `None` = none
    pub unit_timeout: Option<Duration>,
    /// Anchor refresh period
    pub anchor_refresh: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_in_flight: Some(64),
            unit_timeout: Some(Duration::from_secs(30)),
            anchor_refresh: Duration::from_secs(10),
        }
    }
}

impl From<&Config> for PipelineOptions {
    fn from(config: &Config) -> Self {
        Self {
            max_in_flight: config.max_in_flight(),
            unit_timeout: config.unit_timeout(),
            anchor_refresh: config.anchor_refresh(),
        }
    }
}

type UnitOutcome = (String, TrackerResult<()>);

/// The ingest loop.
#[derive(Debug)]
pub struct Pipeline {
    ctx: Context,
    options: PipelineOptions,
    permits: Option<Arc<Semaphore>>,
}

impl Pipeline {
    /// Create a pipeline over `ctx`.
    #[must_use]
    pub fn new(ctx: Context, options: PipelineOptions) -> Self {
        let permits = options.max_in_flight.map(|n| Arc::new(Semaphore::new(n)));
        Self {
            ctx,
            options,
            permits,
        }
    }

    /// Shared context.
    #[must_use]
    pub const fn context(&self) -> &Context {
        &self.ctx
    }

    /// Consume `transactions` until the sender side closes, then wait for
    /// in-flight units and return the final counters.
    pub async fn run(
        &self,
        mut transactions: mpsc::UnboundedReceiver<Transaction>,
        events: mpsc::UnboundedSender<SwapEvent>,
    ) -> StatsSnapshot {
        let anchor_task = tokio::spawn(refresh_anchor_loop(
            Arc::clone(&self.ctx.pools),
            self.options.anchor_refresh,
        ));
        let mut throughput = tokio::time::interval_at(
            tokio::time::Instant::now() + THROUGHPUT_INTERVAL,
            THROUGHPUT_INTERVAL,
        );
        let mut last_report = (Instant::now(), 0u64);
        let mut units: JoinSet<UnitOutcome> = JoinSet::new();

        loop {
            tokio::select! {
                received = transactions.recv() => match received {
                    Some(tx) => self.ingest(&tx, &mut units, &events).await,
                    None => break,
                },
                Some(joined) = units.join_next(), if !units.is_empty() => self.settle(joined),
                _ = throughput.tick() => {
                    last_report = self.report_throughput(last_report, units.len());
                }
            }
        }

        debug!(in_flight = units.len(), "Subscription closed, draining units");
        while let Some(joined) = units.join_next().await {
            self.settle(joined);
        }
        anchor_task.abort();

        let stats = self.ctx.stats.snapshot();
        info!(
            received = stats.received,
            emitted = stats.emitted,
            failed = stats.failed,
            "Pipeline finished"
        );
        stats
    }

    async fn ingest(
        &self,
        tx: &Transaction,
        units: &mut JoinSet<UnitOutcome>,
        events: &mpsc::UnboundedSender<SwapEvent>,
    ) {
        Stats::bump(&self.ctx.stats.received);
        let swap = match swap::decode_transaction(tx) {
            Ok(Decision::Accept(swap)) => swap,
            Ok(Decision::Reject(reason)) => {
                Stats::bump(&self.ctx.stats.rejected);
                debug!(hash = %tx.hash, lt = tx.lt, %reason, "Transaction skipped");
                return;
            }
            Err(e) => {
                Stats::bump(&self.ctx.stats.failed);
                warn!(hash = %tx.hash, lt = tx.lt, error = %e, "Swap payload malformed");
                return;
            }
        };
        Stats::bump(&self.ctx.stats.accepted);

        let permit = self.acquire().await;
        let ctx = self.ctx.clone();
        let events = events.clone();
        let timeout = self.options.unit_timeout;
        units.spawn(async move {
            let hash = swap.hash.clone();
            let outcome = run_unit(ctx, swap, events, timeout, permit).await;
            (hash, outcome)
        });
    }

    async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        let permits = self.permits.as_ref()?;
        Arc::clone(permits).acquire_owned().await.ok()
    }

    fn settle(&self, joined: Result<UnitOutcome, JoinError>) {
        match joined {
            Ok((_, Ok(()))) => {}
            Ok((hash, Err(e))) => {
                Stats::bump(&self.ctx.stats.failed);
                warn!(%hash, error = %e, "Swap dropped");
            }
            Err(e) => {
                Stats::bump(&self.ctx.stats.failed);
                error!(error = %e, "Resolution unit panicked");
            }
        }
    }

    fn report_throughput(&self, (since, emitted_before): (Instant, u64), in_flight: usize) -> (Instant, u64) {
        let stats = self.ctx.stats.snapshot();
        let elapsed = since.elapsed().as_secs_f64().max(f64::EPSILON);
        let delta = stats.emitted.saturating_sub(emitted_before);
        #[allow(clippy::cast_precision_loss)]
        let rate = format!("{:.2}/s", delta as f64 / elapsed);
        info!(
            emitted = delta,
            rate = %rate,
            in_flight,
            received = stats.received,
            failed = stats.failed,
            "Throughput"
        );
        (Instant::now(), stats.emitted)
    }
}

async fn run_unit(
    ctx: Context,
    swap: DecodedSwap,
    events: mpsc::UnboundedSender<SwapEvent>,
    timeout: Option<Duration>,
    _permit: Option<OwnedSemaphorePermit>,
) -> TrackerResult<()> {
    let work = swap::enrich(swap, &ctx.resolver, &ctx.pools);
    let event = match timeout {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .map_err(|_| TrackerError::state(format!("resolution timed out after {limit:?}"), None))??,
        None => work.await?,
    };
    events
        .send(event)
        .map_err(|_| TrackerError::state("event channel closed", None))?;
    Stats::bump(&ctx.stats.emitted);
    Ok(())
}

async fn refresh_anchor_loop(pools: Arc<PoolCache>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match pools.refresh_anchor().await {
            Ok(price) => info!(%price, "Native price refreshed"),
            Err(e) => warn!(error = %e, "Anchor refresh failed, keeping previous price"),
        }
    }
}

/// Render events to the log and push CSV records to `sink`.
///
/// Returns the number of events rendered once `events` closes.
pub async fn emit(
    mut events: mpsc::UnboundedReceiver<SwapEvent>,
    format: DisplayFormat,
    sink: broadcast::Sender<String>,
) -> u64 {
    let mut count = 0u64;
    while let Some(event) = events.recv().await {
        info!("{}", format.render(&event));
        // No subscribers is not an error
        let _ = sink.send(event.to_csv());
        count += 1;
    }
    count
}
