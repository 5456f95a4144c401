//! Pool cache and the price book it feeds.
//!
//! Pools and prices live behind one [`RwLock`] so a reserve update and the
//! price recomputation it triggers are a single step: readers never observe
//! fresh reserves with a stale price, or the reverse.
//!
//! Network calls (`get_pool_data`, issuer resolution) always run before the
//! write lock is taken; the critical section only merges results and
//! recomputes prices.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use super::{PoolData, PoolState};
use crate::address::Address;
use crate::chain::ChainClient;
use crate::error::{TrackerError, TrackerResult};
use crate::jetton::{JettonResolver, TokenIssuerInfo};
use crate::pricing::{FixedPrice, PoolSide, PriceBook};

/// A pool together with both side prices, read in one critical section.
#[derive(Debug, Clone)]
pub struct PoolSnapshot {
    /// Pool state at the time of the read
    pub pool: PoolState,
    /// Price of token0, if known
    pub token0_price: Option<FixedPrice>,
    /// Price of token1, if known
    pub token1_price: Option<FixedPrice>,
}

#[derive(Debug, Default)]
struct Ledger {
    pools: HashMap<Address, PoolState>,
    prices: PriceBook,
}

fn side(issuer: Option<&Arc<TokenIssuerInfo>>, reserve: alloy::primitives::U256) -> Option<PoolSide<'_>> {
    let issuer = issuer?;
    Some(PoolSide {
        symbol: issuer.symbol.as_deref()?,
        decimals: issuer.decimals_or_default(),
        reserve,
    })
}

impl Ledger {
    fn recompute_pool(&mut self, address: &Address) {
        let Some(pool) = self.pools.get(address) else {
            return;
        };
        let (Some(side0), Some(side1)) = (
            side(pool.token0.as_ref(), pool.data.reserve0),
            side(pool.token1.as_ref(), pool.data.reserve1),
        ) else {
            return;
        };
        if let Err(e) = self.prices.derive_pool(side0, side1) {
            warn!(pool = %address, error = %e, "Price derivation failed, keeping previous price");
        }
    }

    fn recompute_all(&mut self) {
        let addresses: Vec<Address> = self.pools.keys().copied().collect();
        for address in &addresses {
            self.recompute_pool(address);
        }
    }

    fn price_of(&self, issuer: Option<&Arc<TokenIssuerInfo>>) -> Option<FixedPrice> {
        issuer
            .and_then(|i| i.symbol.as_deref())
            .and_then(|symbol| self.prices.get(symbol))
    }

    fn snapshot(&self, address: &Address) -> Option<PoolSnapshot> {
        self.pools.get(address).map(|pool| PoolSnapshot {
            token0_price: self.price_of(pool.token0.as_ref()),
            token1_price: self.price_of(pool.token1.as_ref()),
            pool: pool.clone(),
        })
    }
}

/// Lazily populated cache of pools with an attached [`PriceBook`].
pub struct PoolCache {
    chain: Arc<dyn ChainClient>,
    resolver: Arc<JettonResolver>,
    anchor: Address,
    ledger: RwLock<Ledger>,
}

impl std::fmt::Debug for PoolCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolCache")
            .field("anchor", &self.anchor)
            .finish_non_exhaustive()
    }
}

impl PoolCache {
    /// Create an empty cache priced from the `anchor` pool.
    #[must_use]
    pub fn new(chain: Arc<dyn ChainClient>, resolver: Arc<JettonResolver>, anchor: Address) -> Self {
        Self {
            chain,
            resolver,
            anchor,
            ledger: RwLock::new(Ledger::default()),
        }
    }

    /// Address of the anchor pool.
    #[must_use]
    pub const fn anchor(&self) -> &Address {
        &self.anchor
    }

    async fn fetch_pool_data(&self, address: &Address) -> TrackerResult<PoolData> {
        let result = self
            .chain
            .run_get_method_at_head(address, "get_pool_data")
            .await?;
        PoolData::from_stack(&result)
    }

    async fn resolve_side(&self, wallet: &Address) -> Option<Arc<TokenIssuerInfo>> {
        match self.resolver.resolve_issuer(wallet).await {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(%wallet, error = %e, "Pool token issuer unresolved");
                None
            }
        }
    }

    /// Whether `address` is cached.
    pub async fn contains(&self, address: &Address) -> bool {
        self.ledger.read().await.pools.contains_key(address)
    }

    /// Cached snapshot of `address`, without touching the network.
    pub async fn get(&self, address: &Address) -> Option<PoolSnapshot> {
        self.ledger.read().await.snapshot(address)
    }

    /// Cached snapshot of `address`, creating the entry on a miss.
    ///
    /// A miss reads the LP description (failure leaves it empty), queries
    /// `get_pool_data` and resolves both token issuers (failures leave them
    /// empty). A hit returns the cached state without a reserve refresh.
    ///
    /// # Errors
    ///
    /// Returns an error only if `get_pool_data` fails or is malformed.
    #[instrument(skip(self, address), fields(pool = %address))]
    pub async fn get_or_create(&self, address: &Address) -> TrackerResult<PoolSnapshot> {
        if let Some(snapshot) = self.get(address).await {
            return Ok(snapshot);
        }

        let (lp, data) = tokio::join!(self.resolver.describe_issuer(address), self.fetch_pool_data(address));
        let data = data?;
        let lp = lp
            .map_err(|e| warn!(error = %e, "LP metadata unavailable"))
            .ok();
        let (token0, token1) = tokio::join!(
            self.resolve_side(&data.token0_wallet),
            self.resolve_side(&data.token1_wallet)
        );

        let mut ledger = self.ledger.write().await;
        match ledger.pools.entry(*address) {
            Entry::Occupied(mut existing) => {
                debug!("Pool created concurrently, merging reserves");
                existing.get_mut().apply_reserves(&data);
            }
            Entry::Vacant(slot) => {
                info!(
                    symbol = lp.as_ref().and_then(|l| l.symbol.as_deref()).unwrap_or("unknown"),
                    token0 = token0.as_ref().map_or("unknown", |t| t.symbol_or_unknown()),
                    token1 = token1.as_ref().map_or("unknown", |t| t.symbol_or_unknown()),
                    "Pool cached"
                );
                slot.insert(PoolState {
                    address: *address,
                    lp,
                    token0,
                    token1,
                    data,
                });
            }
        }
        ledger.recompute_pool(address);
        ledger
            .snapshot(address)
            .ok_or_else(|| TrackerError::state(format!("pool {address} vanished after insert"), None))
    }

    /// Re-query reserves of a cached pool and recompute prices.
    ///
    /// Token issuers that are still unknown are retried here.
    ///
    /// # Errors
    ///
    /// Returns a state error if the pool is not cached and propagates
    /// `get_pool_data` failures.
    #[instrument(skip(self, address), fields(pool = %address))]
    pub async fn refresh_reserves(&self, address: &Address) -> TrackerResult<PoolSnapshot> {
        let data = self.fetch_pool_data(address).await?;

        let (need0, need1) = {
            let ledger = self.ledger.read().await;
            let pool = ledger
                .pools
                .get(address)
                .ok_or_else(|| TrackerError::state(format!("pool {address} is not cached"), None))?;
            (pool.token0.is_none(), pool.token1.is_none())
        };
        let token0 = if need0 { self.resolve_side(&data.token0_wallet).await } else { None };
        let token1 = if need1 { self.resolve_side(&data.token1_wallet).await } else { None };

        let mut ledger = self.ledger.write().await;
        let pool = ledger
            .pools
            .get_mut(address)
            .ok_or_else(|| TrackerError::state(format!("pool {address} is not cached"), None))?;
        pool.apply_reserves(&data);
        if pool.token0.is_none() {
            pool.token0 = token0;
        }
        if pool.token1.is_none() {
            pool.token1 = token1;
        }
        debug!(reserve0 = %data.reserve0, reserve1 = %data.reserve1, "Reserves refreshed");
        ledger.recompute_pool(address);
        ledger
            .snapshot(address)
            .ok_or_else(|| TrackerError::state(format!("pool {address} is not cached"), None))
    }

    /// Refresh a cached pool or create it.
    ///
    /// # Errors
    ///
    /// See [`Self::get_or_create`] and [`Self::refresh_reserves`].
    pub async fn observe(&self, address: &Address) -> TrackerResult<PoolSnapshot> {
        if self.contains(address).await {
            self.refresh_reserves(address).await
        } else {
            self.get_or_create(address).await
        }
    }

    /// Re-query the anchor pool, reprice the native asset and recompute every
    /// cached pool.
    ///
    /// # Errors
    ///
    /// Propagates `get_pool_data` and price derivation failures; prices are
    /// left untouched on failure.
    #[instrument(skip(self), fields(anchor = %self.anchor))]
    pub async fn refresh_anchor(&self) -> TrackerResult<FixedPrice> {
        let data = self.fetch_pool_data(&self.anchor).await?;

        let mut ledger = self.ledger.write().await;
        let native = ledger.prices.update_anchor(data.reserve0, data.reserve1)?;
        if let Some(pool) = ledger.pools.get_mut(&self.anchor) {
            pool.apply_reserves(&data);
        }
        ledger.recompute_all();
        Ok(native)
    }

    /// Latest price of `symbol`.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::PriceNotFound`] if `symbol` was never priced.
    pub async fn symbol_price(&self, symbol: &str) -> TrackerResult<FixedPrice> {
        self.ledger.read().await.prices.symbol_price(symbol)
    }

    /// All prices, sorted by symbol.
    pub async fn prices(&self) -> Vec<(String, FixedPrice)> {
        self.ledger.read().await.prices.entries()
    }

    /// Snapshots of every cached pool.
    pub async fn snapshots(&self) -> Vec<PoolSnapshot> {
        let ledger = self.ledger.read().await;
        ledger
            .pools
            .keys()
            .filter_map(|address| ledger.snapshot(address))
            .collect()
    }

    /// Number of cached pools.
    pub async fn pool_count(&self) -> usize {
        self.ledger.read().await.pools.len()
    }
}
