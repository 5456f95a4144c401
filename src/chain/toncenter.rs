//! toncenter HTTP API v2 client.
//!
//! Implements [`ChainClient`] over the public toncenter JSON API:
//! `getMasterchainInfo`, `getAddressInformation`, `runGetMethod` and
//! `getTransactions`. The transaction subscription polls `getTransactions`
//! on a fixed interval, pages backwards until it reaches the last delivered
//! logical time and forwards the batch oldest first. A transaction that
//! cannot be converted is skipped, but the stream position still moves past
//! it.
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use ton_swap_watcher::chain::{ChainClient, TonCenterClient};
//! use ton_swap_watcher::error::TrackerResult;
//!
//! # async fn example() -> TrackerResult<()> {
//! let client = TonCenterClient::new("https://toncenter.com/api/v2", None, Duration::from_millis(1500))?;
//! let head = client.head_block().await?;
//! println!("Masterchain seqno: {}", head.seqno);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::U256;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::{AccountState, BlockRef, ChainClient, Message, MethodResult, StackValue, Transaction, TvmInt};
use crate::address::Address;
use crate::cell::{boc, Cell};
use crate::error::{TrackerError, TrackerResult};

/// Transactions requested per `getTransactions` page.
const PAGE_SIZE: usize = 50;

/// Pages walked in one poll before the backlog is reported.
const BACKLOG_PAGES: usize = 20;

/// Longest delay between polls after repeated failures.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// HTTP request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error: Option<String>,
    code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct MasterchainInfo {
    last: BlockIdExt,
}

#[derive(Debug, Deserialize)]
struct BlockIdExt {
    seqno: u32,
}

#[derive(Debug, Deserialize)]
struct AddressInformation {
    state: String,
    last_transaction_id: TransactionId,
}

#[derive(Debug, Clone, Deserialize)]
struct TransactionId {
    lt: String,
    hash: String,
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    utime: u32,
    transaction_id: TransactionId,
    in_msg: Option<RawMessage>,
    #[serde(default)]
    out_msgs: Vec<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    source: String,
    #[serde(default)]
    destination: String,
    msg_data: Option<MsgData>,
}

#[derive(Debug, Deserialize)]
struct MsgData {
    #[serde(rename = "@type")]
    kind: String,
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunGetMethodResult {
    exit_code: i32,
    #[serde(default)]
    stack: Vec<Value>,
}

/// [`ChainClient`] backed by the toncenter HTTP API.
#[derive(Debug, Clone)]
pub struct TonCenterClient {
    http: reqwest::Client,
    base_url: Arc<str>,
    api_key: Option<Arc<str>>,
    poll_interval: Duration,
}

impl TonCenterClient {
    /// Create a client for `base_url` (e.g. `https://toncenter.com/api/v2`).
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the URL is not HTTP(S) or the HTTP client
    /// cannot be built.
    pub fn new(base_url: &str, api_key: Option<String>, poll_interval: Duration) -> TrackerResult<Self> {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(TrackerError::rpc(
                format!("Invalid toncenter URL: '{base_url}'. Expected format: 'https://toncenter.com/api/v2'"),
                None,
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TrackerError::rpc("Failed to build HTTP client", Some(Box::new(e))))?;

        info!(base_url, authenticated = api_key.is_some(), "toncenter client initialized");

        Ok(Self {
            http,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            api_key: api_key.map(Arc::from),
            poll_interval,
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("X-API-Key", key.as_ref()),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: &str,
        builder: reqwest::RequestBuilder,
    ) -> TrackerResult<T> {
        let response = self
            .request(builder)
            .send()
            .await
            .map_err(|e| TrackerError::rpc(format!("{method} request failed"), Some(Box::new(e))))?;

        let status = response.status();
        let body: ApiResponse<T> = response.json().await.map_err(|e| {
            TrackerError::rpc(
                format!("{method} returned an unreadable response (HTTP {status})"),
                Some(Box::new(e)),
            )
        })?;

        match body {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { error, code, .. } => Err(TrackerError::rpc(
                format!(
                    "{method} failed (HTTP {status}, code {}): {}",
                    code.unwrap_or_default(),
                    error.unwrap_or_else(|| "no error message".to_string())
                ),
                None,
            )),
        }
    }

    async fn get<T: DeserializeOwned>(&self, method: &str, query: &[(&str, String)]) -> TrackerResult<T> {
        let url = format!("{}/{method}", self.base_url);
        self.send(method, self.http.get(url).query(query)).await
    }

    async fn post<T: DeserializeOwned>(&self, method: &str, body: &Value) -> TrackerResult<T> {
        let url = format!("{}/{method}", self.base_url);
        self.send(method, self.http.post(url).json(body)).await
    }

    /// Fetch every transaction on `address` newer than `last_lt`.
    ///
    /// Pages backwards until `last_lt` is reached, however deep the backlog.
    async fn fetch_since(&self, address: &Address, last_lt: u64) -> TrackerResult<Batch> {
        let mut batch = Batch::new(last_lt);
        let mut cursor: Option<TransactionId> = None;
        let mut pages = 0usize;

        loop {
            let mut query = vec![
                ("address", address.to_string()),
                ("limit", PAGE_SIZE.to_string()),
                ("to_lt", last_lt.to_string()),
                ("archival", "true".to_string()),
            ];
            if let Some(id) = &cursor {
                query.push(("lt", id.lt.clone()));
                query.push(("hash", id.hash.clone()));
            }

            let page: Vec<RawTransaction> = self.get("getTransactions", &query).await?;
            let full = page.len() >= PAGE_SIZE;
            pages += 1;

            match batch.absorb(page) {
                Some(id) if full => {
                    if pages == BACKLOG_PAGES {
                        warn!(
                            %address,
                            pages,
                            from_lt = last_lt,
                            collected = batch.transactions.len(),
                            "Deep transaction backlog, still paging"
                        );
                    }
                    cursor = Some(id);
                }
                _ => break,
            }
        }

        batch.transactions.sort_by_key(|tx| tx.lt);
        Ok(batch)
    }

    async fn poll_transactions(self, address: Address, from_lt: u64, sender: mpsc::UnboundedSender<Transaction>) {
        let mut last_lt = from_lt;
        let mut delay = self.poll_interval;

        loop {
            if sender.is_closed() {
                debug!(%address, "Transaction receiver dropped, stopping poller");
                return;
            }

            match self.fetch_since(&address, last_lt).await {
                Ok(batch) => {
                    delay = self.poll_interval;
                    if !batch.transactions.is_empty() {
                        debug!(%address, count = batch.transactions.len(), from_lt = last_lt, "New transactions");
                    }
                    for tx in batch.transactions {
                        if sender.send(tx).is_err() {
                            debug!(%address, "Transaction receiver dropped, stopping poller");
                            return;
                        }
                    }
                    last_lt = last_lt.max(batch.last_lt);
                }
                Err(e) => {
                    delay = next_backoff(delay);
                    warn!(%address, error = %e, retry_in = ?delay, "Transaction poll failed");
                }
            }

            tokio::time::sleep(delay).await;
        }
    }
}

/// Transactions gathered by one poll.
#[derive(Debug)]
struct Batch {
    /// Converted transactions newer than the floor
    transactions: Vec<Transaction>,
    /// Highest logical time seen, skipped transactions included
    last_lt: u64,
    floor_lt: u64,
    oldest_lt: u64,
}

impl Batch {
    const fn new(floor_lt: u64) -> Self {
        Self {
            transactions: Vec::new(),
            last_lt: floor_lt,
            floor_lt,
            oldest_lt: u64::MAX,
        }
    }

    /// Take the new transactions of one newest-first page. Returns the id of
    /// the oldest new one, the cursor for the next page.
    fn absorb(&mut self, page: Vec<RawTransaction>) -> Option<TransactionId> {
        let mut next = None;
        for raw in page {
            let id = raw.transaction_id.clone();
            let lt = match id.lt.parse::<u64>() {
                Ok(lt) => lt,
                Err(e) => {
                    warn!(lt = %id.lt, hash = %id.hash, error = %e, "Transaction with invalid lt skipped");
                    continue;
                }
            };
            if lt <= self.floor_lt || lt >= self.oldest_lt {
                continue;
            }
            self.oldest_lt = lt;
            self.last_lt = self.last_lt.max(lt);

            match convert_transaction(raw, lt) {
                Ok(tx) => self.transactions.push(tx),
                Err(e) => warn!(lt, hash = %id.hash, error = %e, "Undecodable transaction skipped"),
            }
            next = Some(id);
        }
        next
    }
}

/// Double `delay` up to [`MAX_BACKOFF`] and apply ±25% jitter.
fn next_backoff(delay: Duration) -> Duration {
    let doubled = std::cmp::min(delay * 2, MAX_BACKOFF);
    let jitter_factor = 0.25 * (rand::random::<f64>() - 0.5);
    #[allow(clippy::cast_possible_truncation)]
    let jitter_ms = (doubled.as_millis() as f64 * jitter_factor).round() as i64;
    if jitter_ms >= 0 {
        doubled + Duration::from_millis(jitter_ms.unsigned_abs())
    } else {
        doubled.saturating_sub(Duration::from_millis(jitter_ms.unsigned_abs()))
    }
}

fn parse_optional_address(raw: &str) -> TrackerResult<Option<Address>> {
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse().map(Some)
}

fn convert_message(raw: RawMessage) -> TrackerResult<Message> {
    let body = match raw.msg_data {
        Some(MsgData { kind, body: Some(body) }) if kind == "msg.dataRaw" => boc::deserialize_base64(&body)?,
        _ => Arc::new(Cell::default()),
    };
    Ok(Message {
        source: parse_optional_address(&raw.source)?,
        destination: parse_optional_address(&raw.destination)?,
        body,
    })
}

fn convert_transaction(raw: RawTransaction, lt: u64) -> TrackerResult<Transaction> {
    Ok(Transaction {
        hash: raw.transaction_id.hash,
        lt,
        now: raw.utime,
        in_msg: raw.in_msg.map(convert_message).transpose()?,
        out_msgs: raw
            .out_msgs
            .into_iter()
            .map(convert_message)
            .collect::<TrackerResult<_>>()?,
    })
}

fn parse_num(raw: &str) -> TrackerResult<TvmInt> {
    let (negative, digits) = raw
        .strip_prefix('-')
        .map_or((false, raw), |rest| (true, rest));
    let hex = digits.strip_prefix("0x").unwrap_or(digits);
    let magnitude = U256::from_str_radix(hex, 16).map_err(|e| {
        TrackerError::decoding(format!("invalid stack number '{raw}'"), Some(Box::new(e)))
    })?;
    Ok(TvmInt {
        negative,
        magnitude,
    })
}

fn parse_stack_entry(index: usize, entry: &Value) -> TrackerResult<StackValue> {
    let malformed = || TrackerError::decoding(format!("stack[{index}]: malformed entry {entry}"), None);
    let (tag, value) = match entry.as_array().map(Vec::as_slice) {
        Some([tag, value]) => (tag.as_str().ok_or_else(malformed)?, value),
        _ => return Err(malformed()),
    };

    match tag {
        "num" => value
            .as_str()
            .ok_or_else(malformed)
            .and_then(parse_num)
            .map(StackValue::Int),
        "cell" | "slice" => {
            let bytes = value["bytes"].as_str().ok_or_else(malformed)?;
            let cell = boc::deserialize_base64(bytes).map_err(|e| e.in_field(&format!("stack[{index}]")))?;
            Ok(if tag == "cell" {
                StackValue::Cell(cell)
            } else {
                StackValue::Slice(cell)
            })
        }
        "null" => Ok(StackValue::Null),
        other => Ok(StackValue::Unsupported(other.to_string())),
    }
}

#[async_trait]
impl ChainClient for TonCenterClient {
    #[instrument(skip(self))]
    async fn head_block(&self) -> TrackerResult<BlockRef> {
        let info: MasterchainInfo = self.get("getMasterchainInfo", &[]).await?;
        debug!(seqno = info.last.seqno, "Head block fetched");
        Ok(BlockRef {
            seqno: info.last.seqno,
        })
    }

    #[instrument(skip(self), fields(%address))]
    async fn account_state(&self, address: &Address) -> TrackerResult<AccountState> {
        let info: AddressInformation = self
            .get("getAddressInformation", &[("address", address.to_string())])
            .await?;
        let last_lt = info.last_transaction_id.lt.parse::<u64>().map_err(|e| {
            TrackerError::rpc(
                format!("invalid last transaction lt '{}'", info.last_transaction_id.lt),
                Some(Box::new(e)),
            )
        })?;
        Ok(AccountState {
            active: info.state == "active",
            last_lt,
        })
    }

    #[instrument(skip(self, block), fields(%address, seqno = block.seqno, duration_ms = tracing::field::Empty))]
    async fn run_get_method(
        &self,
        block: &BlockRef,
        address: &Address,
        method: &str,
    ) -> TrackerResult<MethodResult> {
        let start = std::time::Instant::now();
        let body = json!({
            "address": address.to_string(),
            "method": method,
            "stack": [],
            "seqno": block.seqno,
        });
        let raw: RunGetMethodResult = self.post("runGetMethod", &body).await?;

        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::Span::current().record("duration_ms", duration_ms);

        // TVM exit codes 0 and 1 both mean success.
        if raw.exit_code != 0 && raw.exit_code != 1 {
            return Err(TrackerError::rpc(
                format!("{method} on {address} exited with code {}", raw.exit_code),
                None,
            ));
        }

        let stack = raw
            .stack
            .iter()
            .enumerate()
            .map(|(i, entry)| parse_stack_entry(i, entry))
            .collect::<TrackerResult<Vec<_>>>()?;
        debug!(method, entries = stack.len(), duration_ms, "Get-method completed");

        Ok(MethodResult {
            exit_code: raw.exit_code,
            stack,
        })
    }

    async fn subscribe_transactions(
        &self,
        address: &Address,
        from_lt: u64,
    ) -> TrackerResult<mpsc::UnboundedReceiver<Transaction>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        info!(%address, from_lt, interval = ?self.poll_interval, "Subscribing to transactions");
        tokio::spawn(self.clone().poll_transactions(*address, from_lt, sender));
        Ok(receiver)
    }
}
