//! Price endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::{debug, instrument};

use crate::api::middleware::error::ApiError;
use crate::api::models::PriceResponse;
use crate::app_state::AppState;

/// Returns every derived price, sorted by symbol.
#[instrument(skip(state))]
pub async fn list_prices(State(state): State<AppState>) -> Json<Vec<PriceResponse>> {
    let prices = state
        .pools
        .prices()
        .await
        .into_iter()
        .map(|(symbol, price)| PriceResponse::new(symbol, price))
        .collect();
    Json(prices)
}

/// Returns the latest price of one symbol.
#[instrument(skip(state))]
pub async fn get_price(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<PriceResponse>, ApiError> {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Err(ApiError::BadRequest("symbol must not be empty".to_string()));
    }

    let price = state.pools.symbol_price(symbol).await?;
    debug!(%price, "Price served");
    Ok(Json(PriceResponse::new(symbol, price)))
}
