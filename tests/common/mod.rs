//! In-memory chain and metadata fixtures shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alloy::primitives::U256;
use async_trait::async_trait;
use tokio::sync::mpsc;

use ton_swap_watcher::address::Address;
use ton_swap_watcher::cell::{Cell, CellBuilder};
use ton_swap_watcher::chain::{
    AccountState, BlockRef, ChainClient, Message, MethodResult, StackValue, Transaction, TvmInt,
};
use ton_swap_watcher::error::{TrackerError, TrackerResult};
use ton_swap_watcher::jetton::{JettonContent, JettonMetadata, MetadataFetcher};
use ton_swap_watcher::swap::decoder::{OP_SWAP, OP_TRANSFER_NOTIFICATION};

/// Deterministic address `0:bb..bb`.
pub fn addr(byte: u8) -> Address {
    Address::new(0, [byte; 32])
}

pub fn int(value: u64) -> StackValue {
    StackValue::Int(TvmInt::positive(U256::from(value)))
}

pub fn address_slice(address: &Address) -> TrackerResult<StackValue> {
    let cell = CellBuilder::new().store_address(Some(address))?.build()?;
    Ok(StackValue::Slice(Arc::new(cell)))
}

fn ok(stack: Vec<StackValue>) -> MethodResult {
    MethodResult { exit_code: 0, stack }
}

/// `get_wallet_data`: balance, owner, master, wallet code.
pub fn wallet_data(owner: &Address, master: &Address) -> TrackerResult<MethodResult> {
    Ok(ok(vec![
        int(0),
        address_slice(owner)?,
        address_slice(master)?,
        StackValue::Cell(Arc::new(Cell::default())),
    ]))
}

/// `get_jetton_data`: supply, mintable, admin, content, wallet code.
pub fn jetton_data(supply: u64, content: &JettonContent) -> TrackerResult<MethodResult> {
    jetton_data_raw(supply, content.to_cell()?)
}

/// `get_jetton_data` with an arbitrary content cell.
pub fn jetton_data_raw(supply: u64, content: Cell) -> TrackerResult<MethodResult> {
    Ok(ok(vec![
        int(supply),
        StackValue::Int(TvmInt {
            negative: true,
            magnitude: U256::from(1u64),
        }),
        address_slice(&addr(0xad))?,
        StackValue::Cell(Arc::new(content)),
        StackValue::Cell(Arc::new(Cell::default())),
    ]))
}

/// `get_pool_data` with 0.2% / 0.1% / 0.1% fees.
pub fn pool_data(
    reserve0: u64,
    reserve1: u64,
    wallet0: &Address,
    wallet1: &Address,
) -> TrackerResult<MethodResult> {
    Ok(ok(vec![
        int(reserve0),
        int(reserve1),
        address_slice(wallet0)?,
        address_slice(wallet1)?,
        int(20),
        int(10),
        int(10),
        address_slice(&addr(0xfe))?,
        int(0),
        int(0),
    ]))
}

pub fn on_chain(pairs: &[(&str, &str)]) -> JettonContent {
    JettonContent::OnChain {
        attributes: pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect(),
    }
}

pub fn off_chain(uri: &str) -> JettonContent {
    JettonContent::OffChain {
        uri: uri.to_string(),
    }
}

/// Parameters of one router swap transaction.
#[derive(Debug, Clone)]
pub struct SwapFixture {
    pub lt: u64,
    pub src_wallet: Address,
    pub dst_wallet: Address,
    pub pool: Address,
    pub trader: Address,
    pub amount: U256,
    pub min_out: U256,
    /// Opcode inside the notification's forward payload
    pub intent_op: u32,
    /// Opcode of the router → pool message
    pub router_op: u32,
}

impl SwapFixture {
    fn notification(&self) -> TrackerResult<Cell> {
        let payload = CellBuilder::new()
            .store_uint(u64::from(self.intent_op), 32)?
            .store_address(Some(&self.dst_wallet))?
            .store_coins(self.min_out)?
            .store_address(Some(&self.trader))?
            .store_bit(false)?
            .build()?;
        CellBuilder::new()
            .store_uint(u64::from(OP_TRANSFER_NOTIFICATION), 32)?
            .store_uint(self.lt, 64)?
            .store_coins(self.amount)?
            .store_address(Some(&self.trader))?
            .store_bit(true)?
            .store_ref(payload)?
            .build()
    }

    fn router_swap(&self) -> TrackerResult<Cell> {
        CellBuilder::new()
            .store_uint(u64::from(self.router_op), 32)?
            .store_uint(self.lt, 64)?
            .store_address(Some(&self.trader))?
            .store_address(Some(&self.trader))?
            .build()
    }

    /// The transaction as seen on `router`.
    pub fn transaction(&self, router: &Address) -> TrackerResult<Transaction> {
        Ok(Transaction {
            hash: format!("tx-{}", self.lt),
            lt: self.lt,
            now: 1_700_000_000 + u32::try_from(self.lt).unwrap_or(0),
            in_msg: Some(Message {
                source: Some(self.src_wallet),
                destination: Some(*router),
                body: Arc::new(self.notification()?),
            }),
            out_msgs: vec![Message {
                source: Some(*router),
                destination: Some(self.pool),
                body: Arc::new(self.router_swap()?),
            }],
        })
    }
}

/// Chain double answering get-methods from a table.
#[derive(Debug, Default)]
pub struct MockChain {
    methods: Mutex<HashMap<(Address, String), MethodResult>>,
    transactions: Mutex<Vec<Transaction>>,
    calls: Mutex<HashMap<(Address, String), usize>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(self, address: &Address, method: &str, result: MethodResult) -> Self {
        self.set_method(address, method, result);
        self
    }

    /// Replace the answer of `method` on `address`, e.g. after a trade.
    pub fn set_method(&self, address: &Address, method: &str, result: MethodResult) {
        if let Ok(mut methods) = self.methods.lock() {
            methods.insert((*address, method.to_string()), result);
        }
    }

    pub fn with_transactions(self, transactions: Vec<Transaction>) -> Self {
        if let Ok(mut slot) = self.transactions.lock() {
            *slot = transactions;
        }
        self
    }

    /// Invocations of `method` on any address.
    pub fn calls(&self, method: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.iter().filter(|((_, m), _)| m == method).map(|(_, n)| n).sum())
            .unwrap_or(0)
    }

    /// Invocations of `method` on `address`.
    pub fn calls_on(&self, address: &Address, method: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(&(*address, method.to_string())).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn head_block(&self) -> TrackerResult<BlockRef> {
        Ok(BlockRef { seqno: 1 })
    }

    async fn account_state(&self, _address: &Address) -> TrackerResult<AccountState> {
        Ok(AccountState {
            active: true,
            last_lt: 0,
        })
    }

    async fn run_get_method(
        &self,
        _block: &BlockRef,
        address: &Address,
        method: &str,
    ) -> TrackerResult<MethodResult> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry((*address, method.to_string())).or_insert(0) += 1;
        }
        let answer = self
            .methods
            .lock()
            .map_err(|_| TrackerError::state("methods lock poisoned", None))?
            .get(&(*address, method.to_string()))
            .cloned();
        answer.ok_or_else(|| TrackerError::rpc(format!("{method} on {address}: exit code 11"), None))
    }

    async fn subscribe_transactions(
        &self,
        _address: &Address,
        from_lt: u64,
    ) -> TrackerResult<mpsc::UnboundedReceiver<Transaction>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let transactions = self
            .transactions
            .lock()
            .map(|t| t.clone())
            .map_err(|_| TrackerError::state("transactions lock poisoned", None))?;
        for transaction in transactions.into_iter().filter(|t| t.lt > from_lt) {
            let _ = tx.send(transaction);
        }
        Ok(rx)
    }
}

/// Metadata double serving documents from a table.
#[derive(Debug, Default)]
pub struct MockFetcher {
    documents: HashMap<String, JettonMetadata>,
    calls: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, uri: &str, symbol: &str, decimals: u8) -> Self {
        self.documents.insert(
            uri.to_string(),
            JettonMetadata {
                symbol: Some(symbol.to_string()),
                name: Some(format!("{symbol} token")),
                decimals: Some(decimals),
                ..JettonMetadata::default()
            },
        );
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataFetcher for MockFetcher {
    async fn fetch(&self, uri: &str) -> TrackerResult<Arc<JettonMetadata>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.documents
            .get(uri)
            .cloned()
            .map(Arc::new)
            .ok_or_else(|| TrackerError::metadata(format!("GET {uri}: 404"), None))
    }
}

/// A router, one jUSDT/SCALE pool, the anchor pool and all their jettons.
pub struct Market {
    pub router: Address,
    pub anchor: Address,
    pub pool: Address,
    pub usdt_wallet: Address,
    pub scale_wallet: Address,
    pub usdt_master: Address,
    pub scale_master: Address,
}

pub const SCALE_URI: &str = "https://example.org/scale.json";

impl Market {
    pub fn new() -> Self {
        Self {
            router: addr(0x01),
            anchor: addr(0xa0),
            pool: addr(0xb0),
            usdt_wallet: addr(0x10),
            scale_wallet: addr(0x11),
            usdt_master: addr(0x20),
            scale_master: addr(0x21),
        }
    }

    /// Chain with 1000 jUSDT / 500 SCALE in the pool and 5000 jUSDT /
    /// 2000 pTON in the anchor pool.
    pub fn chain(&self) -> TrackerResult<MockChain> {
        Ok(MockChain::new()
            .with_method(&self.usdt_wallet, "get_wallet_data", wallet_data(&self.router, &self.usdt_master)?)
            .with_method(&self.scale_wallet, "get_wallet_data", wallet_data(&self.router, &self.scale_master)?)
            .with_method(
                &self.usdt_master,
                "get_jetton_data",
                jetton_data(
                    10_000_000_000,
                    &on_chain(&[("symbol", "jUSDT"), ("name", "Tether USD"), ("decimals", "6")]),
                )?,
            )
            .with_method(&self.scale_master, "get_jetton_data", jetton_data(1_000_000_000_000, &off_chain(SCALE_URI))?)
            .with_method(
                &self.pool,
                "get_jetton_data",
                jetton_data(1_000, &on_chain(&[("symbol", "jUSDT-SCALE LP"), ("decimals", "9")]))?,
            )
            .with_method(
                &self.pool,
                "get_pool_data",
                pool_data(1_000_000_000, 500_000_000_000, &self.usdt_wallet, &self.scale_wallet)?,
            )
            .with_method(
                &self.anchor,
                "get_pool_data",
                pool_data(5_000_000_000, 2_000_000_000_000, &addr(0x30), &addr(0x31))?,
            ))
    }

    pub fn fetcher(&self) -> MockFetcher {
        MockFetcher::new().with_document(SCALE_URI, "SCALE", 9)
    }

    /// jUSDT → SCALE swap of 1.5 jUSDT.
    pub fn buy(&self, lt: u64) -> SwapFixture {
        SwapFixture {
            lt,
            src_wallet: self.usdt_wallet,
            dst_wallet: self.scale_wallet,
            pool: self.pool,
            trader: addr(0x77),
            amount: U256::from(1_500_000u64),
            min_out: U256::from(700_000_000u64),
            intent_op: OP_SWAP,
            router_op: OP_SWAP,
        }
    }

    /// SCALE → jUSDT swap of 2 SCALE.
    pub fn sell(&self, lt: u64) -> SwapFixture {
        SwapFixture {
            lt,
            src_wallet: self.scale_wallet,
            dst_wallet: self.usdt_wallet,
            pool: self.pool,
            trader: addr(0x78),
            amount: U256::from(2_000_000_000u64),
            min_out: U256::from(3_900_000u64),
            intent_op: OP_SWAP,
            router_op: OP_SWAP,
        }
    }
}
