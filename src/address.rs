//! TON account addresses.
//!
//! Two textual forms are accepted:
//! - raw: `0:83dfd552e63729b472fcbcc8c45ebcc6691702558b68ec7527e1ba403a0f31a8`
//! - user-friendly: 48 base64 characters (standard or url-safe) encoding
//!   `flags | workchain | hash | crc16`
//!
//! Addresses always print in the user-friendly bounceable mainnet form, so
//! cache keys and log lines agree regardless of how an address was parsed.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::hex;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;

use crate::error::{TrackerError, TrackerResult};

const FLAG_BOUNCEABLE: u8 = 0x11;
const FLAG_NON_BOUNCEABLE: u8 = 0x51;
const FLAG_TESTNET: u8 = 0x80;

/// A standard (`addr_std`) account address.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    workchain: i8,
    hash: [u8; 32],
}

impl Address {
    /// Create an address from its workchain and account hash.
    #[must_use]
    pub const fn new(workchain: i8, hash: [u8; 32]) -> Self {
        Self { workchain, hash }
    }

    /// Workchain id (0 for basechain, -1 for masterchain).
    #[must_use]
    pub const fn workchain(&self) -> i8 {
        self.workchain
    }

    /// 256-bit account hash.
    #[must_use]
    pub const fn hash(&self) -> &[u8; 32] {
        &self.hash
    }

    /// Raw `workchain:hex` form.
    #[must_use]
    pub fn to_raw(&self) -> String {
        format!("{}:{}", self.workchain, hex::encode(self.hash))
    }

    /// Abbreviated user-friendly form, e.g. `EQB3...TiUt`.
    #[must_use]
    pub fn short(&self) -> String {
        let full = self.to_string();
        format!("{}...{}", &full[..4], &full[full.len() - 4..])
    }

    fn parse_raw(s: &str) -> TrackerResult<Self> {
        let (wc, hash_hex) = s
            .split_once(':')
            .ok_or_else(|| TrackerError::decoding(format!("invalid raw address {s}"), None))?;
        let workchain = wc.parse::<i8>().map_err(|e| {
            TrackerError::decoding(format!("invalid workchain in {s}"), Some(Box::new(e)))
        })?;
        let bytes = hex::decode(hash_hex).map_err(|e| {
            TrackerError::decoding(format!("invalid hash in {s}"), Some(Box::new(e)))
        })?;
        let hash: [u8; 32] = bytes
            .try_into()
            .map_err(|_| TrackerError::decoding(format!("hash in {s} is not 32 bytes"), None))?;
        Ok(Self::new(workchain, hash))
    }

    fn parse_friendly(s: &str) -> TrackerResult<Self> {
        let bytes = if s.contains('-') || s.contains('_') {
            URL_SAFE.decode(s)
        } else {
            STANDARD.decode(s)
        }
        .map_err(|e| TrackerError::decoding(format!("invalid address {s}"), Some(Box::new(e))))?;

        if bytes.len() != 36 {
            return Err(TrackerError::decoding(
                format!("address {s} decodes to {} bytes, expected 36", bytes.len()),
                None,
            ));
        }

        let flags = bytes[0] & !FLAG_TESTNET;
        if flags != FLAG_BOUNCEABLE && flags != FLAG_NON_BOUNCEABLE {
            return Err(TrackerError::decoding(
                format!("address {s} has unknown flags {:#04x}", bytes[0]),
                None,
            ));
        }

        let expected = crc16(&bytes[..34]);
        let actual = u16::from_be_bytes([bytes[34], bytes[35]]);
        if expected != actual {
            return Err(TrackerError::decoding(
                format!("address {s} fails its checksum"),
                None,
            ));
        }

        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[2..34]);
        #[allow(clippy::cast_possible_wrap)]
        let workchain = bytes[1] as i8;
        Ok(Self::new(workchain, hash))
    }
}

impl FromStr for Address {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.contains(':') {
            Self::parse_raw(s)
        } else {
            Self::parse_friendly(s)
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bytes = Vec::with_capacity(36);
        bytes.push(FLAG_BOUNCEABLE);
        #[allow(clippy::cast_sign_loss)]
        bytes.push(self.workchain as u8);
        bytes.extend_from_slice(&self.hash);
        let crc = crc16(&bytes);
        bytes.extend_from_slice(&crc.to_be_bytes());
        f.write_str(&URL_SAFE.encode(bytes))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

/// CRC-16/XMODEM as used by user-friendly addresses.
fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for byte in data {
        crc ^= u16::from(*byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROUTER: &str = "EQB3ncyBUTjZUA5EnFKR5_EnOMI9V1tTEAAPaiU71gc4TiUt";

    #[test]
    fn test_friendly_round_trip() -> TrackerResult<()> {
        let addr: Address = ROUTER.parse()?;
        assert_eq!(addr.workchain(), 0);
        assert_eq!(addr.to_string(), ROUTER);
        Ok(())
    }

    #[test]
    fn test_raw_and_friendly_agree() -> TrackerResult<()> {
        let addr: Address = ROUTER.parse()?;
        let raw: Address = addr.to_raw().parse()?;
        assert_eq!(addr, raw);
        Ok(())
    }

    #[test]
    fn test_non_bounceable_maps_to_same_account() -> TrackerResult<()> {
        let addr: Address = ROUTER.parse()?;
        let mut bytes = vec![FLAG_NON_BOUNCEABLE, 0];
        bytes.extend_from_slice(addr.hash());
        let crc = crc16(&bytes);
        bytes.extend_from_slice(&crc.to_be_bytes());
        let non_bounceable: Address = URL_SAFE.encode(bytes).parse()?;
        assert_eq!(non_bounceable, addr);
        Ok(())
    }

    #[test]
    fn test_checksum_mismatch() {
        let tampered = ROUTER.replace("EQB3", "EQB4");
        assert!(tampered.parse::<Address>().is_err());
    }

    #[test]
    fn test_short_form() -> TrackerResult<()> {
        let addr: Address = ROUTER.parse()?;
        assert_eq!(addr.short(), "EQB3...TiUt");
        Ok(())
    }

    #[test]
    fn test_garbage_rejected() {
        assert!("not-an-address".parse::<Address>().is_err());
        assert!("0:zz".parse::<Address>().is_err());
    }
}
