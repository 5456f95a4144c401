//! API response models.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::jetton::TokenIssuerInfo;
use crate::pipeline::StatsSnapshot;
use crate::pool::PoolSnapshot;
use crate::pricing::{format_units, FixedPrice};

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall health status
    pub status: HealthStatus,
    /// Application version
    pub version: String,
    /// Uptime in seconds
    pub uptime_seconds: u64,
    /// Cached pools
    pub pools: usize,
    /// Priced symbols
    pub prices: usize,
    /// Open stream subscribers
    pub subscribers: usize,
    /// Pipeline counters
    pub stats: StatsSnapshot,
}

/// Health status states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Native asset priced
    Healthy,
    /// Waiting for the first anchor refresh
    Degraded,
}

/// One symbol price.
#[derive(Debug, Clone, Serialize)]
pub struct PriceResponse {
    /// Jetton symbol
    pub symbol: String,
    /// USD price, e.g. `"2.5"`
    pub price: String,
    /// Raw fixed-point value and scale
    pub raw: FixedPrice,
}

impl PriceResponse {
    /// Build from a price book entry.
    #[must_use]
    pub fn new(symbol: impl Into<String>, price: FixedPrice) -> Self {
        Self {
            symbol: symbol.into(),
            price: price.to_string(),
            raw: price,
        }
    }
}

/// Token metadata.
#[derive(Debug, Clone, Serialize)]
pub struct TokenInfo {
    /// Token symbol
    pub symbol: String,
    /// Token name
    pub name: String,
    /// Jetton master address
    pub master: String,
    /// Token decimals
    pub decimals: u8,
    /// Total supply in human units
    pub total_supply: String,
}

impl From<&TokenIssuerInfo> for TokenInfo {
    fn from(info: &TokenIssuerInfo) -> Self {
        Self {
            symbol: info.symbol_or_unknown().to_string(),
            name: info.name_or_unknown().to_string(),
            master: info.address.to_string(),
            decimals: info.decimals_or_default(),
            total_supply: format_units(info.total_supply, info.decimals_or_default()),
        }
    }
}

/// Pool metadata for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct PoolInfo {
    /// Pool address
    pub address: String,
    /// LP symbol, e.g. `"jUSDT-pTON LP"`
    pub lp_symbol: Option<String>,
    /// Token0 metadata
    pub token0: Option<TokenInfo>,
    /// Token1 metadata
    pub token1: Option<TokenInfo>,
    /// Raw token0 reserve
    pub reserve0: String,
    /// Raw token1 reserve
    pub reserve1: String,
    /// Token0 USD price
    pub token0_price: Option<String>,
    /// Token1 USD price
    pub token1_price: Option<String>,
    /// LP fee (basis points)
    pub lp_fee: u64,
    /// Protocol fee (basis points)
    pub protocol_fee: u64,
    /// Referral fee (basis points)
    pub ref_fee: u64,
}

impl From<&PoolSnapshot> for PoolInfo {
    fn from(snapshot: &PoolSnapshot) -> Self {
        let pool = &snapshot.pool;
        Self {
            address: pool.address.to_string(),
            lp_symbol: pool.lp_symbol().map(str::to_string),
            token0: pool.token0.as_deref().map(TokenInfo::from),
            token1: pool.token1.as_deref().map(TokenInfo::from),
            reserve0: pool.data.reserve0.to_string(),
            reserve1: pool.data.reserve1.to_string(),
            token0_price: snapshot.token0_price.map(|p| p.to_string()),
            token1_price: snapshot.token1_price.map(|p| p.to_string()),
            lp_fee: pool.data.lp_fee,
            protocol_fee: pool.data.protocol_fee,
            ref_fee: pool.data.ref_fee,
        }
    }
}

/// Error response wrapper.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error type
    pub error: String,
    /// Human-readable message
    pub message: String,
}

/// WebSocket message.
#[derive(Debug, Clone, Serialize)]
pub struct StreamMessage {
    /// `connected`, `swap` or `lagged`
    pub event_type: String,
    /// CSV record (for `swap`) or header (for `connected`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<String>,
    /// Records skipped (for `lagged`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<u64>,
    /// Server time
    pub timestamp: DateTime<Utc>,
}

impl StreamMessage {
    /// Greeting carrying the CSV header.
    #[must_use]
    pub fn connected(header: &str) -> Self {
        Self {
            event_type: "connected".to_string(),
            record: Some(header.to_string()),
            skipped: None,
            timestamp: Utc::now(),
        }
    }

    /// One swap record.
    #[must_use]
    pub fn swap(record: String) -> Self {
        Self {
            event_type: "swap".to_string(),
            record: Some(record),
            skipped: None,
            timestamp: Utc::now(),
        }
    }

    /// Records dropped because the subscriber fell behind.
    #[must_use]
    pub fn lagged(skipped: u64) -> Self {
        Self {
            event_type: "lagged".to_string(),
            record: None,
            skipped: Some(skipped),
            timestamp: Utc::now(),
        }
    }
}
