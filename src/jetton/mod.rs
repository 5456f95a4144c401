//! Jetton entity resolution.
//!
//! A jetton wallet belongs to exactly one jetton master for its whole life,
//! so [`JettonResolver`] caches the wallet → master binding forever. The
//! master's own data (supply, admin, content) is re-queried on every
//! resolution.
//!
//! ```text
//! wallet ──► cache hit? ──no──► get_wallet_data (#2 = master) ──► insert
//!                │yes                                              │
//!                └───────────────────► get_jetton_data(master) ◄───┘
//!                                             │
//!                        content: off-chain ──► MetadataFetcher
//!                                 on/semi-chain ──► attributes
//! ```

pub mod content;
pub mod metadata;

use std::sync::Arc;

use alloy::primitives::U256;
use dashmap::DashMap;
use tracing::{debug, instrument, warn};

use crate::address::Address;
use crate::chain::ChainClient;
use crate::error::{TrackerError, TrackerResult};

pub use content::JettonContent;
pub use metadata::{HttpMetadataFetcher, JettonMetadata, MetadataFetcher};

/// Decimals assumed when a jetton does not declare any (TEP-64 default).
pub const DEFAULT_DECIMALS: u8 = 9;

/// Everything known about a jetton master.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenIssuerInfo {
    /// Master address
    pub address: Address,
    /// Off-chain metadata URI
    pub uri: Option<String>,
    /// Total supply in base units
    pub total_supply: U256,
    /// Whether more tokens can be minted
    pub mintable: bool,
    /// Admin address
    pub admin: Option<Address>,
    /// Ticker symbol
    pub symbol: Option<String>,
    /// Display name
    pub name: Option<String>,
    /// Description
    pub description: Option<String>,
    /// Declared decimals
    pub decimals: Option<u8>,
    /// Image URL
    pub image: Option<String>,
}

impl TokenIssuerInfo {
    /// Declared decimals or [`DEFAULT_DECIMALS`].
    #[must_use]
    pub fn decimals_or_default(&self) -> u8 {
        self.decimals.unwrap_or(DEFAULT_DECIMALS)
    }

    /// Symbol or `"unknown"`.
    #[must_use]
    pub fn symbol_or_unknown(&self) -> &str {
        self.symbol.as_deref().unwrap_or("unknown")
    }

    /// Name or `"unknown"`.
    #[must_use]
    pub fn name_or_unknown(&self) -> &str {
        self.name.as_deref().unwrap_or("unknown")
    }

    fn apply_metadata(&mut self, metadata: &JettonMetadata) {
        self.symbol.clone_from(&metadata.symbol);
        self.name.clone_from(&metadata.name);
        self.description.clone_from(&metadata.description);
        self.decimals = metadata.decimals;
        self.image.clone_from(&metadata.image);
    }

    fn apply_attributes(&mut self, content: &JettonContent, with_symbol: bool) {
        let owned = |name: &str| content.attribute(name).map(str::to_string);
        if with_symbol {
            self.symbol = owned("symbol");
        }
        self.name = owned("name");
        self.description = owned("description");
        self.image = owned("image");
        self.decimals = content
            .attribute("decimals")
            .and_then(|d| d.trim().parse::<u8>().ok());
    }
}

/// Resolves jetton wallets to their masters and describes masters.
pub struct JettonResolver {
    chain: Arc<dyn ChainClient>,
    fetcher: Arc<dyn MetadataFetcher>,
    masters: DashMap<Address, Address>,
}

impl std::fmt::Debug for JettonResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JettonResolver")
            .field("cached_wallets", &self.masters.len())
            .finish_non_exhaustive()
    }
}

impl JettonResolver {
    /// Create a resolver with an empty cache.
    #[must_use]
    pub fn new(chain: Arc<dyn ChainClient>, fetcher: Arc<dyn MetadataFetcher>) -> Self {
        Self {
            chain,
            fetcher,
            masters: DashMap::new(),
        }
    }

    /// Number of cached wallet → master bindings.
    #[must_use]
    pub fn cached_wallets(&self) -> usize {
        self.masters.len()
    }

    /// Master of `wallet`, from cache or via `get_wallet_data`.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the get-method fails and a decoding error if
    /// element #2 is not an address.
    #[instrument(skip(self), fields(%wallet))]
    pub async fn master_of(&self, wallet: &Address) -> TrackerResult<Address> {
        if let Some(master) = self.masters.get(wallet) {
            debug!(master = %*master, "Wallet cache hit");
            return Ok(*master);
        }

        let result = self
            .chain
            .run_get_method_at_head(wallet, "get_wallet_data")
            .await?;
        let master = result
            .address(2)?
            .ok_or_else(|| TrackerError::decoding("get_wallet_data: master is addr_none", None))?;

        // Concurrent misses on the same wallet converge on the first insert.
        let master = *self.masters.entry(*wallet).or_insert(master);
        debug!(%master, "Wallet resolved");
        Ok(master)
    }

    /// Resolve `wallet` to its master's description.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::master_of`] and [`Self::describe_issuer`] failures.
    pub async fn resolve_issuer(&self, wallet: &Address) -> TrackerResult<Arc<TokenIssuerInfo>> {
        let master = self.master_of(wallet).await?;
        self.describe_issuer(&master).await.map(Arc::new)
    }

    /// Query `get_jetton_data` on `master` and interpret its content.
    ///
    /// Off-chain metadata that cannot be fetched leaves the descriptive
    /// fields empty instead of failing.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the get-method fails, a decoding error for a
    /// malformed result and [`TrackerError::UnsupportedContent`] for an
    /// unknown content layout.
    #[instrument(skip(self), fields(%master))]
    pub async fn describe_issuer(&self, master: &Address) -> TrackerResult<TokenIssuerInfo> {
        let result = self
            .chain
            .run_get_method_at_head(master, "get_jetton_data")
            .await?;

        let mut info = TokenIssuerInfo {
            address: *master,
            total_supply: result.uint(0).map_err(|e| e.in_field("total_supply"))?,
            mintable: result.flag(1).map_err(|e| e.in_field("mintable"))?,
            admin: result.address(2).map_err(|e| e.in_field("admin"))?,
            ..TokenIssuerInfo::default()
        };
        let content = JettonContent::parse(result.slice(3).map_err(|e| e.in_field("content"))?)?;

        match &content {
            JettonContent::OffChain { uri } => {
                info.uri = Some(uri.clone());
                match self.fetcher.fetch(uri).await {
                    Ok(metadata) => info.apply_metadata(&metadata),
                    Err(e) => warn!(%uri, error = %e, "Off-chain metadata unavailable"),
                }
            }
            JettonContent::OnChain { .. } => info.apply_attributes(&content, true),
            JettonContent::SemiChain { uri, .. } => {
                info.uri = Some(uri.clone());
                info.apply_attributes(&content, false);
            }
        }

        debug!(symbol = ?info.symbol, decimals = ?info.decimals, "Jetton described");
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn content(pairs: &[(&str, &str)]) -> JettonContent {
        JettonContent::OnChain {
            attributes: pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn test_on_chain_attributes_include_symbol() {
        let mut info = TokenIssuerInfo::default();
        info.apply_attributes(&content(&[("symbol", "SCALE"), ("decimals", "9")]), true);
        assert_eq!(info.symbol.as_deref(), Some("SCALE"));
        assert_eq!(info.decimals, Some(9));
    }

    #[test]
    fn test_semi_chain_attributes_skip_symbol() {
        let mut info = TokenIssuerInfo::default();
        info.apply_attributes(&content(&[("symbol", "SEMI"), ("name", "Semi")]), false);
        assert_eq!(info.symbol, None);
        assert_eq!(info.name.as_deref(), Some("Semi"));
    }

    #[test]
    fn test_defaults() {
        let info = TokenIssuerInfo::default();
        assert_eq!(info.decimals_or_default(), DEFAULT_DECIMALS);
        assert_eq!(info.symbol_or_unknown(), "unknown");
        assert_eq!(info.name_or_unknown(), "unknown");
    }
}
