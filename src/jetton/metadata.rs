//! Off-chain jetton metadata.
//!
//! Off-chain and semi-chain jettons publish a JSON document with `symbol`,
//! `name`, `description`, `decimals` and `image`. Publishers disagree on the
//! type of `decimals`, so a number is tried first and a numeric string second.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::{TrackerError, TrackerResult};

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

const IPFS_GATEWAY: &str = "https://ipfs.io/ipfs/";

/// Parsed metadata document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JettonMetadata {
    /// Ticker symbol
    pub symbol: Option<String>,
    /// Display name
    pub name: Option<String>,
    /// Free-form description
    pub description: Option<String>,
    /// Number of decimals
    pub decimals: Option<u8>,
    /// Image URL
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    symbol: Option<String>,
    name: Option<String>,
    description: Option<String>,
    decimals: Option<Value>,
    image: Option<String>,
}

/// Interpret a `decimals` value: number first, then numeric string.
#[must_use]
pub fn parse_decimals(value: &Value) -> Option<u8> {
    value
        .as_u64()
        .and_then(|n| u8::try_from(n).ok())
        .or_else(|| value.as_str().and_then(|s| s.trim().parse::<u8>().ok()))
}

impl JettonMetadata {
    /// Parse a metadata document.
    ///
    /// # Errors
    ///
    /// Returns a metadata error if the body is not a JSON object.
    pub fn from_json(body: &[u8]) -> TrackerResult<Self> {
        let raw: RawMetadata = serde_json::from_slice(body)
            .map_err(|e| TrackerError::metadata("metadata is not valid JSON", Some(Box::new(e))))?;
        Ok(Self {
            symbol: raw.symbol,
            name: raw.name,
            description: raw.description,
            decimals: raw.decimals.as_ref().and_then(parse_decimals),
            image: raw.image,
        })
    }
}

/// Source of off-chain metadata documents.
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    /// Fetch and parse the document at `uri`.
    async fn fetch(&self, uri: &str) -> TrackerResult<Arc<JettonMetadata>>;
}

/// [`MetadataFetcher`] over HTTP with a per-URI cache of parsed documents.
///
/// `ipfs://` URIs are rewritten to a public gateway. Failed fetches are not
/// cached.
#[derive(Debug)]
pub struct HttpMetadataFetcher {
    http: reqwest::Client,
    cache: DashMap<String, Arc<JettonMetadata>>,
}

impl HttpMetadataFetcher {
    /// Create a fetcher with an empty cache.
    ///
    /// # Errors
    ///
    /// Returns a metadata error if the HTTP client cannot be built.
    pub fn new() -> TrackerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| TrackerError::metadata("Failed to build HTTP client", Some(Box::new(e))))?;
        Ok(Self {
            http,
            cache: DashMap::new(),
        })
    }

    /// Number of cached documents.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

fn resolve_uri(uri: &str) -> String {
    uri.strip_prefix("ipfs://")
        .map_or_else(|| uri.to_string(), |cid| format!("{IPFS_GATEWAY}{cid}"))
}

#[async_trait]
impl MetadataFetcher for HttpMetadataFetcher {
    #[instrument(skip(self), fields(duration_ms = tracing::field::Empty))]
    async fn fetch(&self, uri: &str) -> TrackerResult<Arc<JettonMetadata>> {
        if let Some(hit) = self.cache.get(uri) {
            debug!("Metadata cache hit");
            return Ok(Arc::clone(hit.value()));
        }

        let start = std::time::Instant::now();
        let url = resolve_uri(uri);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| TrackerError::metadata(format!("GET {url} failed"), Some(Box::new(e))))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| TrackerError::metadata(format!("reading {url} failed"), Some(Box::new(e))))?;

        let metadata = Arc::new(
            JettonMetadata::from_json(&body).map_err(|e| match e {
                TrackerError::MetadataError { message, source } => {
                    TrackerError::metadata(format!("{url}: {message}"), source)
                }
                other => other,
            })?,
        );

        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::Span::current().record("duration_ms", duration_ms);
        debug!(symbol = ?metadata.symbol, "Metadata fetched");

        self.cache.insert(uri.to_string(), Arc::clone(&metadata));
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decimals_number_then_string() {
        assert_eq!(parse_decimals(&json!(6)), Some(6));
        assert_eq!(parse_decimals(&json!("9")), Some(9));
        assert_eq!(parse_decimals(&json!(" 18 ")), Some(18));
        assert_eq!(parse_decimals(&json!("nine")), None);
        assert_eq!(parse_decimals(&json!(1000)), None);
        assert_eq!(parse_decimals(&json!(null)), None);
    }

    #[test]
    fn test_from_json() -> TrackerResult<()> {
        let body = br#"{"symbol":"jUSDT","name":"jUSDT","decimals":"6","image":"https://x/y.png"}"#;
        let meta = JettonMetadata::from_json(body)?;
        assert_eq!(meta.symbol.as_deref(), Some("jUSDT"));
        assert_eq!(meta.decimals, Some(6));
        assert_eq!(meta.description, None);
        Ok(())
    }

    #[test]
    fn test_invalid_json() {
        let err = JettonMetadata::from_json(b"<html>");
        assert!(matches!(err, Err(TrackerError::MetadataError { .. })));
    }

    #[test]
    fn test_ipfs_rewrite() {
        assert_eq!(resolve_uri("ipfs://bafy/meta.json"), "https://ipfs.io/ipfs/bafy/meta.json");
        assert_eq!(resolve_uri("https://a/b.json"), "https://a/b.json");
    }
}
