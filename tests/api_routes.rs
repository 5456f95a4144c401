//! Broadcast server routes served in-process.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

mod common;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use ton_swap_watcher::api::server::build_router;
use ton_swap_watcher::app_state::AppState;
use ton_swap_watcher::pipeline::Context;

use common::Market;

fn router(market: &Market) -> (Router, Context) {
    let chain = Arc::new(market.chain().unwrap());
    let ctx = Context::new(chain, Arc::new(market.fetcher()), market.anchor);
    let state = AppState::new(ctx.pools.clone(), ctx.stats.clone());
    (build_router(state), ctx)
}

async fn get(router: Router, uri: &str) -> (StatusCode, Value) {
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_health_degraded_until_anchor() {
    let market = Market::new();
    let (router, ctx) = router(&market);

    let (status, body) = get(router.clone(), "/api/v1/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["prices"], 1);

    ctx.pools.refresh_anchor().await.unwrap();
    let (_, body) = get(router, "/api/v1/health").await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["prices"], 2);
}

#[tokio::test]
async fn test_price_lookup() {
    let market = Market::new();
    let (router, ctx) = router(&market);
    ctx.pools.refresh_anchor().await.unwrap();

    let (status, body) = get(router.clone(), "/api/v1/prices/pTON").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["symbol"], "pTON");
    assert_eq!(body["price"], "2.5");
    assert_eq!(body["raw"]["value"], "2500000");

    let (status, body) = get(router, "/api/v1/prices/SCALE").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_pools_listing() {
    let market = Market::new();
    let (router, ctx) = router(&market);
    ctx.pools.get_or_create(&market.pool).await.unwrap();

    let (status, body) = get(router, "/api/v1/pools").await;
    assert_eq!(status, StatusCode::OK);
    let pools = body.as_array().expect("array of pools");
    assert_eq!(pools.len(), 1);
    assert_eq!(pools[0]["lp_symbol"], "jUSDT-SCALE LP");
    assert_eq!(pools[0]["token1_price"], "2");
    assert_eq!(pools[0]["token0"]["symbol"], "jUSDT");
}
