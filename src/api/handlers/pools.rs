//! Pool listing endpoint.

use axum::{extract::State, Json};
use tracing::instrument;

use crate::api::models::PoolInfo;
use crate::app_state::AppState;

/// Returns every cached pool with reserves and side prices.
#[instrument(skip(state))]
pub async fn list_pools(State(state): State<AppState>) -> Json<Vec<PoolInfo>> {
    let mut pools: Vec<PoolInfo> = state.pools.snapshots().await.iter().map(PoolInfo::from).collect();
    pools.sort_by(|a, b| a.lp_symbol.cmp(&b.lp_symbol).then_with(|| a.address.cmp(&b.address)));
    Json(pools)
}
