//! Error types for the swap watcher.
//!
//! This module provides a unified error type [`TrackerError`] covering every
//! failure that can occur while decoding transactions, resolving jettons,
//! caching pools and deriving prices.
//!
//! # Design
//!
//! The error hierarchy is organized by layer:
//! - [`TrackerError::ConfigError`]: Configuration and environment issues
//! - [`TrackerError::RpcError`]: Chain-access network errors
//! - [`TrackerError::MetadataError`]: Off-chain metadata fetch/parse errors
//! - [`TrackerError::DecodingError`]: Cell payload decoding errors
//! - [`TrackerError::UnsupportedContent`]: Jetton content layouts we cannot read
//! - [`TrackerError::StateError`]: Cache and pool state errors
//! - [`TrackerError::MathError`]: Arithmetic and price calculation errors
//! - [`TrackerError::PriceNotFound`]: No derived price for a symbol
//! - [`TrackerError::StartupError`]: Fatal failures before the main loop
//!
//! Only [`TrackerError::StartupError`] terminates the process. Everything
//! else fails a single call, field or transaction.
//!
//! # Example
//!
//! ```
//! use ton_swap_watcher::error::{TrackerError, TrackerResult};
//!
//! fn validate_reserve(reserve: u128) -> TrackerResult<()> {
//!     if reserve == 0 {
//!         return Err(TrackerError::math("reserve cannot be zero", None));
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt;

/// Result type alias using [`TrackerError`].
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Boxed underlying error carried by most variants.
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for the swap watcher.
#[derive(Debug)]
pub enum TrackerError {
    /// Configuration or environment variable errors.
    ConfigError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxedSource>,
    },

    /// Chain-access errors (toncenter HTTP failure, get-method exit code,
    /// malformed API response).
    RpcError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxedSource>,
    },

    /// Off-chain metadata errors (HTTP failure, undecodable JSON).
    MetadataError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxedSource>,
    },

    /// Payload decoding errors.
    ///
    /// Variants include:
    /// - Opcode mismatch
    /// - Cell underflow (not enough bits or refs)
    /// - Malformed address or BOC encoding
    DecodingError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxedSource>,
    },

    /// Jetton content uses a layout outside off-chain, on-chain and semi-chain.
    UnsupportedContent {
        /// Description of the rejected layout
        message: String,
    },

    /// Cache or pool state errors (e.g. malformed LP symbol).
    StateError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxedSource>,
    },

    /// Arithmetic or calculation errors.
    ///
    /// Variants include:
    /// - Division by zero
    /// - Overflow
    MathError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxedSource>,
    },

    /// A symbol has never been paired against a priced anchor asset.
    PriceNotFound {
        /// Requested symbol
        symbol: String,
    },

    /// Fatal error before the main loop starts.
    StartupError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxedSource>,
    },
}

impl TrackerError {
    /// Create a new configuration error.
    ///
    /// # Example
    ///
    /// ```
    /// use ton_swap_watcher::error::TrackerError;
    ///
    /// let err = TrackerError::config("DEX_ADDRESS is invalid", None);
    /// assert!(matches!(err, TrackerError::ConfigError { .. }));
    /// ```
    #[must_use]
    pub fn config(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::ConfigError {
            message: message.into(),
            source,
        }
    }

    /// Create a new chain-access error.
    ///
    /// # Example
    ///
    /// ```
    /// use ton_swap_watcher::error::TrackerError;
    ///
    /// let err = TrackerError::rpc("toncenter unreachable", None);
    /// assert!(matches!(err, TrackerError::RpcError { .. }));
    /// ```
    #[must_use]
    pub fn rpc(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::RpcError {
            message: message.into(),
            source,
        }
    }

    /// Create a new metadata error.
    #[must_use]
    pub fn metadata(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::MetadataError {
            message: message.into(),
            source,
        }
    }

    /// Create a new decoding error.
    ///
    /// # Example
    ///
    /// ```
    /// use ton_swap_watcher::error::TrackerError;
    ///
    /// let err = TrackerError::decoding("inbound query_id: cell underflow", None);
    /// assert!(matches!(err, TrackerError::DecodingError { .. }));
    /// ```
    #[must_use]
    pub fn decoding(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::DecodingError {
            message: message.into(),
            source,
        }
    }

    /// Create a new unsupported-content error.
    #[must_use]
    pub fn unsupported_content(message: impl Into<String>) -> Self {
        Self::UnsupportedContent {
            message: message.into(),
        }
    }

    /// Create a new state error.
    #[must_use]
    pub fn state(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::StateError {
            message: message.into(),
            source,
        }
    }

    /// Create a new math error.
    ///
    /// # Example
    ///
    /// ```
    /// use ton_swap_watcher::error::TrackerError;
    ///
    /// let err = TrackerError::math("Division by zero", None);
    /// assert!(matches!(err, TrackerError::MathError { .. }));
    /// ```
    #[must_use]
    pub fn math(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::MathError {
            message: message.into(),
            source,
        }
    }

    /// Create a price-not-found error.
    #[must_use]
    pub fn price_not_found(symbol: impl Into<String>) -> Self {
        Self::PriceNotFound {
            symbol: symbol.into(),
        }
    }

    /// Create a new startup error.
    #[must_use]
    pub fn startup(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::StartupError {
            message: message.into(),
            source,
        }
    }

    /// Prefix the message with the name of the field being decoded.
    ///
    /// Non-decoding errors are returned unchanged.
    #[must_use]
    pub fn in_field(self, field: &str) -> Self {
        match self {
            Self::DecodingError { message, source } => Self::DecodingError {
                message: format!("{field}: {message}"),
                source,
            },
            other => other,
        }
    }

    /// Whether this error is a network failure (chain or metadata).
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::RpcError { .. } | Self::MetadataError { .. })
    }
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigError { message, .. } => write!(f, "Configuration error: {message}"),
            Self::RpcError { message, .. } => write!(f, "RPC error: {message}"),
            Self::MetadataError { message, .. } => write!(f, "Metadata error: {message}"),
            Self::DecodingError { message, .. } => write!(f, "Decoding error: {message}"),
            Self::UnsupportedContent { message } => {
                write!(f, "Unsupported jetton content: {message}")
            }
            Self::StateError { message, .. } => write!(f, "State error: {message}"),
            Self::MathError { message, .. } => write!(f, "Math error: {message}"),
            Self::PriceNotFound { symbol } => write!(f, "Price not found for {symbol}"),
            Self::StartupError { message, .. } => write!(f, "Startup error: {message}"),
        }
    }
}

impl std::error::Error for TrackerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConfigError { source, .. }
            | Self::RpcError { source, .. }
            | Self::MetadataError { source, .. }
            | Self::DecodingError { source, .. }
            | Self::StateError { source, .. }
            | Self::MathError { source, .. }
            | Self::StartupError { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &dyn std::error::Error),
            Self::UnsupportedContent { .. } | Self::PriceNotFound { .. } => None,
        }
    }
}

/// Convert from `eyre::Report` to `TrackerError`.
///
/// Reports come from the server edge; they are categorized as RPC errors.
impl From<eyre::Report> for TrackerError {
    fn from(err: eyre::Report) -> Self {
        Self::RpcError {
            message: err.to_string(),
            source: None,
        }
    }
}
