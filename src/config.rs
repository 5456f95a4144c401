//! Configuration management for the swap watcher.
//!
//! Configuration is read from environment variables, after loading a `.env`
//! file with `dotenvy` if one is present. Every variable is optional.
//!
//! ## Environment Variables
//!
//! - `TONCENTER_URL`: toncenter v2 endpoint (default: `https://toncenter.com/api/v2`)
//! - `TONCENTER_API_KEY`: API key sent as `X-API-Key` (default: none)
//! - `DEX_ADDRESS`: router account to watch (default: STON.fi router)
//! - `ANCHOR_POOL_ADDRESS`: jUSDT/pTON pool used for the native price
//! - `ANCHOR_REFRESH_SECS`: anchor refresh period (default: 10)
//! - `POLL_INTERVAL_MS`: transaction polling period (default: 1500)
//! - `MAX_IN_FLIGHT`: concurrent resolution units, 0 = unbounded (default: 64)
//! - `UNIT_TIMEOUT_SECS`: per-unit timeout, 0 = none (default: 30)
//!
//! ## Example
//!
//! ```
//! use ton_swap_watcher::config::Config;
//!
//! let config = Config::from_lookup(|key| match key {
//!     "MAX_IN_FLIGHT" => Some("0".to_string()),
//!     _ => None,
//! })
//! .unwrap();
//! assert_eq!(config.max_in_flight(), None);
//! ```

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::address::Address;
use crate::error::{TrackerError, TrackerResult};
use crate::pricing::ANCHOR_POOL;

/// Default toncenter endpoint.
pub const DEFAULT_TONCENTER_URL: &str = "https://toncenter.com/api/v2";

/// STON.fi router.
pub const DEFAULT_DEX_ADDRESS: &str = "EQB3ncyBUTjZUA5EnFKR5_EnOMI9V1tTEAAPaiU71gc4TiUt";

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// toncenter v2 endpoint
    toncenter_url: String,

    /// toncenter API key
    api_key: Option<String>,

    /// Router account to watch
    dex_address: Address,

    /// Pool pricing the native asset
    anchor_pool: Address,

    /// Anchor refresh period
    anchor_refresh: Duration,

    /// Transaction polling period
    poll_interval: Duration,

    /// Concurrent resolution units (0 = unbounded)
    max_in_flight: usize,

    /// Per-unit timeout (0 = none)
    unit_timeout_secs: u64,
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> TrackerResult<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|e| {
            TrackerError::config(format!("{key} is invalid: '{raw}'"), Some(Box::new(e)))
        }),
    }
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a config error if a variable is present but invalid.
    pub fn from_env() -> TrackerResult<Self> {
        // Load .env file if present (ignore error if file doesn't exist)
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns a config error if a value does not parse, an address is not a
    /// valid TON address or the endpoint is not an HTTP(S) URL.
    pub fn from_lookup<F>(lookup: F) -> TrackerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let toncenter_url = lookup("TONCENTER_URL")
            .unwrap_or_else(|| DEFAULT_TONCENTER_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        if !toncenter_url.starts_with("http://") && !toncenter_url.starts_with("https://") {
            return Err(TrackerError::config(
                format!("TONCENTER_URL must be an http(s) URL, got: {toncenter_url}"),
                None,
            ));
        }

        // Empty key means anonymous access
        let api_key = lookup("TONCENTER_API_KEY").filter(|k| !k.trim().is_empty());

        let dex_address = parse_or(&lookup, "DEX_ADDRESS", Address::from_str(DEFAULT_DEX_ADDRESS)?)?;
        let anchor_pool = parse_or(&lookup, "ANCHOR_POOL_ADDRESS", Address::from_str(ANCHOR_POOL)?)?;

        let anchor_refresh_secs: u64 = parse_or(&lookup, "ANCHOR_REFRESH_SECS", 10)?;
        if anchor_refresh_secs == 0 {
            return Err(TrackerError::config("ANCHOR_REFRESH_SECS must be positive", None));
        }
        let poll_interval_ms: u64 = parse_or(&lookup, "POLL_INTERVAL_MS", 1500)?;
        if poll_interval_ms == 0 {
            return Err(TrackerError::config("POLL_INTERVAL_MS must be positive", None));
        }

        Ok(Self {
            toncenter_url,
            api_key,
            dex_address,
            anchor_pool,
            anchor_refresh: Duration::from_secs(anchor_refresh_secs),
            poll_interval: Duration::from_millis(poll_interval_ms),
            max_in_flight: parse_or(&lookup, "MAX_IN_FLIGHT", 64)?,
            unit_timeout_secs: parse_or(&lookup, "UNIT_TIMEOUT_SECS", 30)?,
        })
    }

    /// Get the toncenter endpoint.
    #[must_use]
    pub fn toncenter_url(&self) -> &str {
        &self.toncenter_url
    }

    /// Get the toncenter API key.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Get the watched router address.
    #[must_use]
    pub const fn dex_address(&self) -> &Address {
        &self.dex_address
    }

    /// Get the anchor pool address.
    #[must_use]
    pub const fn anchor_pool(&self) -> &Address {
        &self.anchor_pool
    }

    /// Get the anchor refresh period.
    #[must_use]
    pub const fn anchor_refresh(&self) -> Duration {
        self.anchor_refresh
    }

    /// Get the transaction polling period.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Concurrency bound, `None` when unbounded.
    #[must_use]
    pub const fn max_in_flight(&self) -> Option<usize> {
        match self.max_in_flight {
            0 => None,
            n => Some(n),
        }
    }

    /// Per-unit timeout, `None` when disabled.
    #[must_use]
    pub const fn unit_timeout(&self) -> Option<Duration> {
        match self.unit_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
