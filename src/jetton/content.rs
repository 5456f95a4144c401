//! TEP-64 token data layouts.
//!
//! The content cell returned by `get_jetton_data` starts with a one-byte
//! layout tag:
//!
//! - `0x01`: off-chain, the rest is a snake-encoded URI
//! - `0x00`: on-chain, a `HashmapE 256` from `sha256(attribute)` to a
//!   reference holding the value. If the dictionary carries a `uri` entry
//!   the content is semi-chain: the listed attributes plus an off-chain URI.
//!
//! Any other tag is reported as [`TrackerError::UnsupportedContent`].

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::cell::dict::load_dict;
use crate::cell::{Cell, CellBuilder, CellSlice};
use crate::error::{TrackerError, TrackerResult};

const LAYOUT_ON_CHAIN: u64 = 0x00;
const LAYOUT_OFF_CHAIN: u64 = 0x01;

const DATA_SNAKE: u64 = 0x00;
const DATA_CHUNKED: u64 = 0x01;

/// Attribute names recognized in on-chain dictionaries.
const KNOWN_ATTRIBUTES: [&str; 9] = [
    "uri",
    "name",
    "description",
    "image",
    "image_data",
    "symbol",
    "decimals",
    "amount_style",
    "render_type",
];

/// Jetton master content, one variant per supported layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JettonContent {
    /// Metadata lives at `uri`.
    OffChain {
        /// Metadata JSON location
        uri: String,
    },
    /// All metadata is stored on chain.
    OnChain {
        /// Attribute name to value
        attributes: HashMap<String, String>,
    },
    /// On-chain attributes plus an off-chain URI.
    SemiChain {
        /// Metadata JSON location
        uri: String,
        /// Attribute name to value (without `uri`)
        attributes: HashMap<String, String>,
    },
}

/// `sha256(name)`, the dictionary key of an attribute.
#[must_use]
pub fn attribute_key(name: &str) -> [u8; 32] {
    Sha256::digest(name.as_bytes()).into()
}

impl JettonContent {
    /// Parse a content cell.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::UnsupportedContent`] for an unknown layout tag
    /// and a decoding error for a malformed cell.
    pub fn parse(mut slice: CellSlice) -> TrackerResult<Self> {
        let layout = slice.load_uint(8).map_err(|e| e.in_field("content layout"))?;
        match layout {
            LAYOUT_OFF_CHAIN => {
                let bytes = slice.load_snake_bytes().map_err(|e| e.in_field("content uri"))?;
                Ok(Self::OffChain {
                    uri: String::from_utf8_lossy(&bytes).into_owned(),
                })
            }
            LAYOUT_ON_CHAIN => {
                let mut attributes = parse_attributes(&mut slice)?;
                Ok(match attributes.remove("uri") {
                    Some(uri) => Self::SemiChain { uri, attributes },
                    None => Self::OnChain { attributes },
                })
            }
            other => Err(TrackerError::unsupported_content(format!(
                "layout tag {other:#04x}"
            ))),
        }
    }

    /// Value of an on-chain attribute, if present.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        match self {
            Self::OffChain { .. } => None,
            Self::OnChain { attributes } | Self::SemiChain { attributes, .. } => {
                attributes.get(name).map(String::as_str)
            }
        }
    }

    /// Serialize into a content cell.
    ///
    /// # Errors
    ///
    /// Returns a decoding error if a value does not fit into cells.
    pub fn to_cell(&self) -> TrackerResult<Cell> {
        match self {
            Self::OffChain { uri } => CellBuilder::new()
                .store_uint(LAYOUT_OFF_CHAIN, 8)?
                .store_snake_bytes(uri.as_bytes())?
                .build(),
            Self::OnChain { attributes } => attributes_cell(attributes.iter()),
            Self::SemiChain { uri, attributes } => {
                let uri_key = "uri".to_string();
                attributes_cell(attributes.iter().chain(std::iter::once((&uri_key, uri))))
            }
        }
    }
}

fn parse_attributes(slice: &mut CellSlice) -> TrackerResult<HashMap<String, String>> {
    let names: HashMap<[u8; 32], &str> = KNOWN_ATTRIBUTES
        .iter()
        .map(|name| (attribute_key(name), *name))
        .collect();

    let mut attributes = HashMap::new();
    for (key, mut value) in load_dict(slice, 256).map_err(|e| e.in_field("content dictionary"))? {
        let Some(name) = <[u8; 32]>::try_from(key.as_slice())
            .ok()
            .and_then(|k| names.get(&k))
        else {
            continue;
        };
        let data = value
            .load_ref()
            .and_then(load_content_data)
            .map_err(|e| e.in_field(name))?;
        attributes.insert((*name).to_string(), String::from_utf8_lossy(&data).into_owned());
    }
    Ok(attributes)
}

fn load_content_data(mut slice: CellSlice) -> TrackerResult<Vec<u8>> {
    match slice.load_uint(8)? {
        DATA_SNAKE => slice.load_snake_bytes(),
        DATA_CHUNKED => {
            let mut chunks = load_dict(&mut slice, 32)?;
            chunks.sort_by(|a, b| a.0.cmp(&b.0));
            let mut out = Vec::new();
            for (_, mut chunk) in chunks {
                out.extend(chunk.load_ref()?.load_snake_bytes()?);
            }
            Ok(out)
        }
        other => Err(TrackerError::unsupported_content(format!(
            "attribute data tag {other:#04x}"
        ))),
    }
}

fn attributes_cell<'a>(attributes: impl Iterator<Item = (&'a String, &'a String)>) -> TrackerResult<Cell> {
    let entries = attributes
        .map(|(name, value)| {
            let data = CellBuilder::new()
                .store_uint(DATA_SNAKE, 8)?
                .store_snake_bytes(value.as_bytes())?
                .build()?;
            Ok((attribute_key(name).to_vec(), data))
        })
        .collect::<TrackerResult<Vec<_>>>()?;
    CellBuilder::new()
        .store_uint(LAYOUT_ON_CHAIN, 8)?
        .store_dict_of_refs(256, entries)?
        .build()
}
