//! STON.fi pool state.
//!
//! A pool is itself a jetton master (its LP token), so each [`PoolState`]
//! carries two layers of data:
//!
//! - the LP token description (symbol in the `X-Y LP` pattern, supply, admin)
//! - the `get_pool_data` tuple (reserves, paired wallets, fees)
//!
//! ## `get_pool_data` Layout
//!
//! | Index | Field                              |
//! |-------|------------------------------------|
//! | 0     | reserve0                           |
//! | 1     | reserve1                           |
//! | 2     | token0 wallet (owned by the router)|
//! | 3     | token1 wallet                      |
//! | 4     | lp fee (basis points)              |
//! | 5     | protocol fee                       |
//! | 6     | referral fee                       |
//! | 7     | reserved, kept uninterpreted       |
//! | 8     | collected token0 protocol fee      |
//! | 9     | collected token1 protocol fee      |
//!
//! ## Example
//!
//! ```
//! use ton_swap_watcher::pool::split_lp_symbol;
//!
//! assert_eq!(split_lp_symbol("jUSDT-pTON LP").ok(), Some(("jUSDT", "pTON")));
//! assert!(split_lp_symbol("SCALE").is_err());
//! ```

pub mod cache;

use std::sync::Arc;

use alloy::primitives::U256;

use crate::address::Address;
use crate::chain::{MethodResult, StackValue};
use crate::error::{TrackerError, TrackerResult};
use crate::jetton::TokenIssuerInfo;

pub use cache::{PoolCache, PoolSnapshot};

/// Split an LP symbol `X-Y LP` into `(X, Y)`.
///
/// `X` is everything before the first `-`; `Y` is everything after it up to
/// the last space.
///
/// # Errors
///
/// Returns a state error if there is no `-`, or no space after it.
pub fn split_lp_symbol(symbol: &str) -> TrackerResult<(&str, &str)> {
    let (token0, rest) = symbol.split_once('-').ok_or_else(|| {
        TrackerError::state(format!("LP symbol '{symbol}' has no '-' separator"), None)
    })?;
    let end = rest.rfind(' ').ok_or_else(|| {
        TrackerError::state(format!("LP symbol '{symbol}' has no space after '-'"), None)
    })?;
    Ok((token0, &rest[..end]))
}

/// Decoded `get_pool_data` result.
#[derive(Debug, Clone)]
pub struct PoolData {
    /// Reserve of token0
    pub reserve0: U256,
    /// Reserve of token1
    pub reserve1: U256,
    /// Router's token0 wallet
    pub token0_wallet: Address,
    /// Router's token1 wallet
    pub token1_wallet: Address,
    /// LP fee in basis points
    pub lp_fee: u64,
    /// Protocol fee in basis points
    pub protocol_fee: u64,
    /// Referral fee in basis points
    pub ref_fee: u64,
    /// Element #7 as returned
    pub reserved: StackValue,
    /// Protocol fee collected in token0
    pub collected_token0_protocol_fee: U256,
    /// Protocol fee collected in token1
    pub collected_token1_protocol_fee: U256,
}

fn required_address(result: &MethodResult, index: usize, field: &str) -> TrackerResult<Address> {
    result
        .address(index)
        .and_then(|addr| addr.ok_or_else(|| TrackerError::decoding("addr_none", None)))
        .map_err(|e| e.in_field(field))
}

impl PoolData {
    /// Decode the ten-element `get_pool_data` stack.
    ///
    /// # Errors
    ///
    /// Returns a decoding error naming the first malformed field.
    pub fn from_stack(result: &MethodResult) -> TrackerResult<Self> {
        Ok(Self {
            reserve0: result.uint(0).map_err(|e| e.in_field("reserve0"))?,
            reserve1: result.uint(1).map_err(|e| e.in_field("reserve1"))?,
            token0_wallet: required_address(result, 2, "token0_address")?,
            token1_wallet: required_address(result, 3, "token1_address")?,
            lp_fee: result.u64(4).map_err(|e| e.in_field("lp_fee"))?,
            protocol_fee: result.u64(5).map_err(|e| e.in_field("protocol_fee"))?,
            ref_fee: result.u64(6).map_err(|e| e.in_field("ref_fee"))?,
            reserved: result.get(7)?.clone(),
            collected_token0_protocol_fee: result
                .uint(8)
                .map_err(|e| e.in_field("collected_token0_protocol_fee"))?,
            collected_token1_protocol_fee: result
                .uint(9)
                .map_err(|e| e.in_field("collected_token1_protocol_fee"))?,
        })
    }
}

/// Everything known about one pool.
#[derive(Debug, Clone)]
pub struct PoolState {
    /// Pool (and LP master) address
    pub address: Address,
    /// LP token description, if it could be read
    pub lp: Option<TokenIssuerInfo>,
    /// Issuer of token0, if resolved
    pub token0: Option<Arc<TokenIssuerInfo>>,
    /// Issuer of token1, if resolved
    pub token1: Option<Arc<TokenIssuerInfo>>,
    /// On-chain pool data
    pub data: PoolData,
}

impl PoolState {
    /// LP symbol, e.g. `jUSDT-pTON LP`.
    #[must_use]
    pub fn lp_symbol(&self) -> Option<&str> {
        self.lp.as_ref().and_then(|lp| lp.symbol.as_deref())
    }

    fn split_symbol(&self) -> TrackerResult<(&str, &str)> {
        let symbol = self.lp_symbol().ok_or_else(|| {
            TrackerError::state(format!("pool {} has no LP symbol", self.address), None)
        })?;
        split_lp_symbol(symbol)
    }

    /// Token0 symbol as named by the LP symbol.
    ///
    /// # Errors
    ///
    /// Returns a state error if the LP symbol is missing or malformed.
    pub fn token0_symbol(&self) -> TrackerResult<&str> {
        self.split_symbol().map(|(token0, _)| token0)
    }

    /// Token1 symbol as named by the LP symbol.
    ///
    /// # Errors
    ///
    /// Returns a state error if the LP symbol is missing or malformed.
    pub fn token1_symbol(&self) -> TrackerResult<&str> {
        self.split_symbol().map(|(_, token1)| token1)
    }

    /// Issuer paired with `wallet`, if `wallet` is one of the pool's sides.
    #[must_use]
    pub fn issuer_for_wallet(&self, wallet: &Address) -> Option<&Arc<TokenIssuerInfo>> {
        if *wallet == self.data.token0_wallet {
            self.token0.as_ref()
        } else if *wallet == self.data.token1_wallet {
            self.token1.as_ref()
        } else {
            None
        }
    }

    /// Overwrite reserves and collected fees from a fresh query.
    pub fn apply_reserves(&mut self, fresh: &PoolData) {
        self.data.reserve0 = fresh.reserve0;
        self.data.reserve1 = fresh.reserve1;
        self.data.collected_token0_protocol_fee = fresh.collected_token0_protocol_fee;
        self.data.collected_token1_protocol_fee = fresh.collected_token1_protocol_fee;
    }
}
