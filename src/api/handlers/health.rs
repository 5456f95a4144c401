//! Health check endpoint.

use std::time::SystemTime;

use axum::{extract::State, Json};
use tracing::instrument;

use crate::api::models::{HealthResponse, HealthStatus};
use crate::app_state::AppState;
use crate::pricing::NATIVE_SYMBOL;

/// Returns service health information.
///
/// The service is degraded until the native asset has been priced from the
/// anchor pool.
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = SystemTime::now()
        .duration_since(state.start_time)
        .unwrap_or_default()
        .as_secs();

    let status = if state.pools.symbol_price(NATIVE_SYMBOL).await.is_ok() {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        pools: state.pools.pool_count().await,
        prices: state.pools.prices().await.len(),
        subscribers: state.subscriber_count(),
        stats: state.stats.snapshot(),
    })
}
