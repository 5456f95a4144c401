//! Swap detection and enrichment.
//!
//! [`decoder`] turns a router transaction into a [`DecodedSwap`] without any
//! network access; [`enrich`] then resolves the source issuer and the pool,
//! producing a [`SwapEvent`] that carries whatever could be resolved.

pub mod decoder;
pub mod event;

use tracing::{debug, warn};

use crate::error::{TrackerError, TrackerResult};
use crate::jetton::JettonResolver;
use crate::pool::PoolCache;

pub use decoder::{decode_transaction, Decision, DecodedSwap, Rejection};
pub use event::{Action, SwapEvent, CSV_FIELDS, CSV_HEADER};

/// Resolve the source issuer and pool of `swap`.
///
/// Resolution failures leave the corresponding part empty, except an
/// unsupported content layout on the source issuer, which drops the event.
///
/// # Errors
///
/// Returns [`TrackerError::UnsupportedContent`] from the source issuer.
pub async fn enrich(
    swap: DecodedSwap,
    resolver: &JettonResolver,
    pools: &PoolCache,
) -> TrackerResult<SwapEvent> {
    let source = match resolver.resolve_issuer(&swap.src_jetton).await {
        Ok(info) => Some(info),
        Err(e @ TrackerError::UnsupportedContent { .. }) => return Err(e),
        Err(e) => {
            warn!(hash = %swap.hash, wallet = %swap.src_jetton, error = %e, "Source issuer unresolved");
            None
        }
    };

    let pool = match pools.observe(&swap.pool).await {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            warn!(hash = %swap.hash, pool = %swap.pool, error = %e, "Pool unresolved");
            None
        }
    };

    debug!(hash = %swap.hash, source = source.is_some(), pool = pool.is_some(), "Swap enriched");
    Ok(SwapEvent { swap, source, pool })
}
