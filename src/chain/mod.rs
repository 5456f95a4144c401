//! Chain access for the TON blockchain.
//!
//! Everything the watcher needs from the network goes through the
//! [`ChainClient`] trait:
//!
//! - **Head block** for pinning get-method calls to a consistent state
//! - **Account state** for the starting logical time of a subscription
//! - **Get-methods** (`get_wallet_data`, `get_jetton_data`, `get_pool_data`)
//!   returning a typed TVM stack
//! - **Transaction subscription** delivering an ordered, unbounded stream
//!
//! The production implementation is [`toncenter::TonCenterClient`]; tests
//! substitute an in-memory mock.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────┐      subscribe_transactions
//! │      ChainClient      │ ───────────────────────────► mpsc::UnboundedReceiver<Transaction>
//! │  (async trait object) │
//! └───────────────────────┘      run_get_method
//!            │               ───────────────────────────► MethodResult (typed stack)
//!            ▼
//!   TonCenterClient (HTTP v2 API, polling)
//! ```

pub mod toncenter;

use std::sync::Arc;

use alloy::primitives::U256;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::address::Address;
use crate::cell::{Cell, CellSlice};
use crate::error::{TrackerError, TrackerResult};

pub use toncenter::TonCenterClient;

/// A masterchain block used to pin get-method calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRef {
    /// Masterchain sequence number.
    pub seqno: u32,
}

/// Activity and position of an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountState {
    /// Whether the account has deployed code.
    pub active: bool,
    /// Logical time of the last transaction on the account.
    pub last_lt: u64,
}

/// An internal message carried by a transaction.
#[derive(Debug, Clone)]
pub struct Message {
    /// Sending account (`None` for external inbound messages).
    pub source: Option<Address>,
    /// Receiving account.
    pub destination: Option<Address>,
    /// Message body.
    pub body: Arc<Cell>,
}

impl Message {
    /// Start reading the body from its first bit.
    #[must_use]
    pub fn body(&self) -> CellSlice {
        CellSlice::new(Arc::clone(&self.body))
    }
}

/// A transaction on the watched account.
#[derive(Debug, Clone)]
pub struct Transaction {
    /// Transaction hash, base64 encoded.
    pub hash: String,
    /// Logical time.
    pub lt: u64,
    /// Unix timestamp.
    pub now: u32,
    /// Inbound message, if any.
    pub in_msg: Option<Message>,
    /// Outbound messages in order.
    pub out_msgs: Vec<Message>,
}

/// A TVM integer as returned on the stack (up to 257 bits signed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TvmInt {
    /// Sign of the value.
    pub negative: bool,
    /// Absolute value.
    pub magnitude: U256,
}

impl TvmInt {
    /// A non-negative integer.
    #[must_use]
    pub const fn positive(magnitude: U256) -> Self {
        Self {
            negative: false,
            magnitude,
        }
    }

    /// Whether the value is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.magnitude.is_zero()
    }
}

/// One entry of a get-method result stack.
#[derive(Debug, Clone)]
pub enum StackValue {
    /// Integer.
    Int(TvmInt),
    /// Cell.
    Cell(Arc<Cell>),
    /// Slice (returned with its underlying cell).
    Slice(Arc<Cell>),
    /// Null.
    Null,
    /// Any other entry, kept as its type tag.
    Unsupported(String),
}

impl StackValue {
    fn kind(&self) -> &str {
        match self {
            Self::Int(_) => "int",
            Self::Cell(_) => "cell",
            Self::Slice(_) => "slice",
            Self::Null => "null",
            Self::Unsupported(tag) => tag,
        }
    }
}

/// Result of a get-method invocation.
#[derive(Debug, Clone)]
pub struct MethodResult {
    /// TVM exit code.
    pub exit_code: i32,
    /// Result stack, first returned value at index 0.
    pub stack: Vec<StackValue>,
}

impl MethodResult {
    /// Raw stack entry at `index`.
    ///
    /// # Errors
    ///
    /// Returns a decoding error if the stack is shorter than `index + 1`.
    pub fn get(&self, index: usize) -> TrackerResult<&StackValue> {
        self.stack.get(index).ok_or_else(|| {
            TrackerError::decoding(
                format!("stack[{index}]: missing, stack has {} entries", self.stack.len()),
                None,
            )
        })
    }

    /// Integer at `index`.
    ///
    /// # Errors
    ///
    /// Returns a decoding error if the entry is missing or not an integer.
    pub fn int(&self, index: usize) -> TrackerResult<TvmInt> {
        match self.get(index)? {
            StackValue::Int(value) => Ok(*value),
            other => Err(mismatch(index, "int", other)),
        }
    }

    /// Non-negative integer at `index`.
    ///
    /// # Errors
    ///
    /// Returns a decoding error if the entry is not an integer or is negative.
    pub fn uint(&self, index: usize) -> TrackerResult<U256> {
        let value = self.int(index)?;
        if value.negative && !value.is_zero() {
            return Err(TrackerError::decoding(
                format!("stack[{index}]: expected non-negative int"),
                None,
            ));
        }
        Ok(value.magnitude)
    }

    /// Non-negative integer at `index` that fits in 64 bits.
    ///
    /// # Errors
    ///
    /// Returns a decoding error if the entry is not a small non-negative integer.
    pub fn u64(&self, index: usize) -> TrackerResult<u64> {
        let value = self.uint(index)?;
        u64::try_from(value).map_err(|e| {
            TrackerError::decoding(format!("stack[{index}]: {value} exceeds u64"), Some(Box::new(e)))
        })
    }

    /// TVM boolean at `index` (any non-zero integer is true).
    ///
    /// # Errors
    ///
    /// Returns a decoding error if the entry is not an integer.
    pub fn flag(&self, index: usize) -> TrackerResult<bool> {
        Ok(!self.int(index)?.is_zero())
    }

    /// Cell or slice at `index`, as a fresh cursor.
    ///
    /// # Errors
    ///
    /// Returns a decoding error if the entry is not a cell or slice.
    pub fn slice(&self, index: usize) -> TrackerResult<CellSlice> {
        match self.get(index)? {
            StackValue::Cell(cell) | StackValue::Slice(cell) => {
                Ok(CellSlice::new(Arc::clone(cell)))
            }
            other => Err(mismatch(index, "cell or slice", other)),
        }
    }

    /// `MsgAddress` stored in the slice at `index`.
    ///
    /// # Errors
    ///
    /// Returns a decoding error if the entry is not a slice holding an address.
    pub fn address(&self, index: usize) -> TrackerResult<Option<Address>> {
        self.slice(index)?
            .load_address()
            .map_err(|e| e.in_field(&format!("stack[{index}]")))
    }
}

fn mismatch(index: usize, expected: &str, got: &StackValue) -> TrackerError {
    TrackerError::decoding(
        format!("stack[{index}]: expected {expected}, got {}", got.kind()),
        None,
    )
}

/// Access to a TON node.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Latest masterchain block.
    async fn head_block(&self) -> TrackerResult<BlockRef>;

    /// Current state of `address`.
    async fn account_state(&self, address: &Address) -> TrackerResult<AccountState>;

    /// Run get-method `method` on `address` at `block`.
    async fn run_get_method(
        &self,
        block: &BlockRef,
        address: &Address,
        method: &str,
    ) -> TrackerResult<MethodResult>;

    /// Stream transactions on `address` with logical time above `from_lt`,
    /// oldest first. The stream ends when the receiver is dropped.
    async fn subscribe_transactions(
        &self,
        address: &Address,
        from_lt: u64,
    ) -> TrackerResult<mpsc::UnboundedReceiver<Transaction>>;

    /// Run get-method `method` on `address` at the current head block.
    async fn run_get_method_at_head(
        &self,
        address: &Address,
        method: &str,
    ) -> TrackerResult<MethodResult> {
        let block = self.head_block().await?;
        self.run_get_method(&block, address, method).await
    }
}
