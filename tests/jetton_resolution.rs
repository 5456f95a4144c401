//! Jetton wallet → master resolution and issuer descriptions.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

mod common;

use std::sync::Arc;

use ton_swap_watcher::cell::CellBuilder;
use ton_swap_watcher::error::TrackerError;
use ton_swap_watcher::jetton::JettonResolver;
use ton_swap_watcher::pool::PoolCache;
use ton_swap_watcher::swap::{self, decode_transaction, Decision};

use common::{addr, jetton_data_raw, wallet_data, Market, MockChain, MockFetcher, SCALE_URI};

fn resolver(chain: &Arc<MockChain>, fetcher: MockFetcher) -> JettonResolver {
    JettonResolver::new(chain.clone(), Arc::new(fetcher))
}

#[tokio::test]
async fn test_wallet_master_is_cached() {
    let market = Market::new();
    let chain = Arc::new(market.chain().unwrap());
    let resolver = resolver(&chain, market.fetcher());

    let first = resolver.resolve_issuer(&market.usdt_wallet).await.unwrap();
    let second = resolver.resolve_issuer(&market.usdt_wallet).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.address, market.usdt_master);
    assert_eq!(resolver.cached_wallets(), 1);
    assert_eq!(chain.calls("get_wallet_data"), 1);
    // Descriptions are not cached; supply and metadata may change.
    assert_eq!(chain.calls("get_jetton_data"), 2);
}

#[tokio::test]
async fn test_on_chain_attributes() {
    let market = Market::new();
    let chain = Arc::new(market.chain().unwrap());
    let resolver = resolver(&chain, market.fetcher());

    let info = resolver.resolve_issuer(&market.usdt_wallet).await.unwrap();
    assert_eq!(info.symbol.as_deref(), Some("jUSDT"));
    assert_eq!(info.name.as_deref(), Some("Tether USD"));
    assert_eq!(info.decimals, Some(6));
    assert!(info.uri.is_none());
    assert!(info.mintable);
    assert_eq!(info.admin, Some(addr(0xad)));
}

#[tokio::test]
async fn test_off_chain_metadata_is_fetched() {
    let market = Market::new();
    let chain = Arc::new(market.chain().unwrap());
    let fetcher = Arc::new(market.fetcher());
    let resolver = JettonResolver::new(chain.clone(), fetcher.clone());

    let info = resolver.resolve_issuer(&market.scale_wallet).await.unwrap();
    assert_eq!(info.uri.as_deref(), Some(SCALE_URI));
    assert_eq!(info.symbol.as_deref(), Some("SCALE"));
    assert_eq!(info.name.as_deref(), Some("SCALE token"));
    assert_eq!(info.decimals_or_default(), 9);
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn test_failed_fetch_degrades_metadata() {
    let market = Market::new();
    let chain = Arc::new(market.chain().unwrap());
    let resolver = resolver(&chain, MockFetcher::new());

    let info = resolver.resolve_issuer(&market.scale_wallet).await.unwrap();
    assert_eq!(info.uri.as_deref(), Some(SCALE_URI));
    assert!(info.symbol.is_none());
    assert_eq!(info.symbol_or_unknown(), "unknown");
    assert_eq!(info.total_supply, alloy::primitives::U256::from(1_000_000_000_000u64));
}

#[tokio::test]
async fn test_missing_wallet_is_an_rpc_error() {
    let market = Market::new();
    let chain = Arc::new(market.chain().unwrap());
    let resolver = resolver(&chain, market.fetcher());

    let err = resolver.master_of(&addr(0x99)).await.unwrap_err();
    assert!(matches!(err, TrackerError::RpcError { .. }));
    assert_eq!(resolver.cached_wallets(), 0);
}

#[tokio::test]
async fn test_unsupported_content_drops_swap() {
    let market = Market::new();
    let odd_master = addr(0x40);
    let odd_content = CellBuilder::new().store_uint(0x02, 8).unwrap().build().unwrap();
    let chain = Arc::new(
        market
            .chain()
            .unwrap()
            .with_method(&market.usdt_wallet, "get_wallet_data", wallet_data(&market.router, &odd_master).unwrap())
            .with_method(&odd_master, "get_jetton_data", jetton_data_raw(1, odd_content).unwrap()),
    );
    let resolver = Arc::new(resolver(&chain, market.fetcher()));
    let pools = PoolCache::new(chain.clone(), resolver.clone(), market.anchor);

    let tx = market.buy(1).transaction(&market.router).unwrap();
    let Decision::Accept(decoded) = decode_transaction(&tx).unwrap() else {
        unreachable!("fixture is a swap");
    };
    let err = swap::enrich(decoded, &resolver, &pools).await.unwrap_err();
    assert!(matches!(err, TrackerError::UnsupportedContent { .. }));
}

#[tokio::test]
async fn test_unresolved_source_keeps_event() {
    let market = Market::new();
    let chain = Arc::new(market.chain().unwrap());
    let resolver = Arc::new(resolver(&chain, market.fetcher()));
    let pools = PoolCache::new(chain.clone(), resolver.clone(), market.anchor);

    let mut fixture = market.buy(1);
    fixture.src_wallet = addr(0x55);
    let tx = fixture.transaction(&market.router).unwrap();
    let Decision::Accept(decoded) = decode_transaction(&tx).unwrap() else {
        unreachable!("fixture is a swap");
    };
    let event = swap::enrich(decoded, &resolver, &pools).await.unwrap();
    assert!(event.source.is_none());
    assert!(event.pool.is_some());
    assert_eq!(event.missing(), "source");
}
