//! Pricing module for deriving USD prices from STON.fi pool reserves.
//!
//! Prices are fixed-point integers. Every derived price keeps the scale of
//! the price it was derived from, and the chain of derivations starts at the
//! pinned stable asset (`jUSDT` = 1.000000), so all prices in a [`PriceBook`]
//! are USD at 6 decimals.
//!
//! # Price Calculation
//!
//! For a pool with a priced side A and an unpriced side B:
//! ```text
//! scale  = max(decimals_a, decimals_b)
//! ra     = reserve_a * 10^(scale - decimals_a)
//! rb     = reserve_b * 10^(scale - decimals_b)
//! priceB = floor(ra * priceA / rb)
//! ```
//! Intermediates are 512-bit so no reserve/price combination can overflow
//! before the final division.
//!
//! # Example
//!
//! ```
//! use alloy::primitives::U256;
//! use ton_swap_watcher::pricing::{derive_price, FixedPrice};
//!
//! // 1,000,000 jUSDT (6 dec) against 500,000 pTON (9 dec)
//! let usdt = U256::from(1_000_000u128 * 10u128.pow(6));
//! let pton = U256::from(500_000u128 * 10u128.pow(9));
//!
//! let price = derive_price(usdt, 6, pton, 9, FixedPrice::usd(1_000_000)).unwrap();
//! assert_eq!(price.value, U256::from(2_000_000u64));
//! assert_eq!(price.to_string(), "2");
//! ```

use std::collections::HashMap;
use std::fmt;

use alloy::primitives::{U256, U512};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use tracing::{debug, info};

use crate::error::{TrackerError, TrackerResult};

/// Scale of every USD price.
pub const USD_DECIMALS: u8 = 6;

/// Symbol of the pinned stable asset.
pub const STABLE_SYMBOL: &str = "jUSDT";

/// Decimals of the stable asset.
pub const STABLE_DECIMALS: u8 = 6;

/// Pinned stable price: 1.000000.
pub const STABLE_PRICE: u64 = 1_000_000;

/// Symbol of the native asset as traded on STON.fi (proxy TON).
pub const NATIVE_SYMBOL: &str = "pTON";

/// Decimals of the native asset.
pub const NATIVE_DECIMALS: u8 = 9;

/// The `jUSDT-pTON LP` pool: reserve0 is jUSDT, reserve1 is pTON.
pub const ANCHOR_POOL: &str = "EQAKleHU6-eGDQUfi4YXMNve4UQP0RGAIRkU4AiRRlgDUbaM";

/// LP symbol of the anchor pool.
pub const ANCHOR_POOL_SYMBOL: &str = "jUSDT-pTON LP";

/// A fixed-point price: `value / 10^decimals`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPrice {
    /// Scaled integer value
    pub value: U256,
    /// Number of fractional digits
    pub decimals: u8,
}

impl FixedPrice {
    /// Create a price from its raw parts.
    #[must_use]
    pub const fn new(value: U256, decimals: u8) -> Self {
        Self { value, decimals }
    }

    /// A USD price at [`USD_DECIMALS`].
    #[must_use]
    pub fn usd(value: u64) -> Self {
        Self::new(U256::from(value), USD_DECIMALS)
    }
}

impl Serialize for FixedPrice {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("FixedPrice", 3)?;
        state.serialize_field("value", &self.value.to_string())?;
        state.serialize_field("decimals", &self.decimals)?;
        state.serialize_field("formatted", &self.to_string())?;
        state.end()
    }
}

impl fmt::Display for FixedPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_units(self.value, self.decimals))
    }
}

/// `10^exp` as a 512-bit integer.
fn pow10(exp: u8) -> TrackerResult<U512> {
    U512::from(10u64)
        .checked_pow(U512::from(exp))
        .ok_or_else(|| TrackerError::math(format!("10^{exp} overflows"), None))
}

/// Render `value / 10^decimals` without trailing zeros, e.g. `1.5`.
#[must_use]
pub fn format_units(value: U256, decimals: u8) -> String {
    let digits = value.to_string();
    let decimals = usize::from(decimals);
    if decimals == 0 {
        return digits;
    }
    let padded = format!("{digits:0>width$}", width = decimals + 1);
    let (int_part, frac_part) = padded.split_at(padded.len() - decimals);
    let frac_part = frac_part.trim_end_matches('0');
    if frac_part.is_empty() {
        int_part.to_string()
    } else {
        format!("{int_part}.{frac_part}")
    }
}

/// Derive the price of side B from the reserves of an A/B pool and the
/// price of A. The result keeps `price_a`'s scale and is truncated.
///
/// The value is the floor quotient itself, unscaled, so its fractional digits
/// are those of `price_a` and never `decimals_b`. Token decimals only enter
/// through the reserve normalization.
///
/// # Errors
///
/// Returns a math error if either reserve is zero or the result exceeds
/// 256 bits.
///
/// # Examples
///
/// ```
/// use alloy::primitives::U256;
/// use ton_swap_watcher::pricing::{derive_price, FixedPrice};
///
/// // 3 A (9 dec) against 7 B (9 dec) with A at 1.000000: B = 0.428571
/// let three = U256::from(3_000_000_000u64);
/// let seven = U256::from(7_000_000_000u64);
/// let price = derive_price(three, 9, seven, 9, FixedPrice::usd(1_000_000)).unwrap();
/// assert_eq!(price.value, U256::from(428_571u64));
/// ```
pub fn derive_price(
    reserve_a: U256,
    decimals_a: u8,
    reserve_b: U256,
    decimals_b: u8,
    price_a: FixedPrice,
) -> TrackerResult<FixedPrice> {
    if reserve_a.is_zero() {
        return Err(TrackerError::math(
            "reserve of the priced side is zero, cannot derive price",
            None,
        ));
    }
    if reserve_b.is_zero() {
        return Err(TrackerError::math(
            "reserve of the unpriced side is zero, cannot derive price",
            None,
        ));
    }

    let mut ra = U512::from(reserve_a);
    let mut rb = U512::from(reserve_b);
    let overflow = || TrackerError::math("Overflow when normalizing reserves", None);
    if decimals_a > decimals_b {
        rb = rb.checked_mul(pow10(decimals_a - decimals_b)?).ok_or_else(overflow)?;
    } else {
        ra = ra.checked_mul(pow10(decimals_b - decimals_a)?).ok_or_else(overflow)?;
    }

    let numerator = ra
        .checked_mul(U512::from(price_a.value))
        .ok_or_else(|| TrackerError::math("Overflow multiplying reserve by price", None))?;
    let quotient = numerator / rb;

    let value = U256::checked_from_limbs_slice(quotient.as_limbs())
        .ok_or_else(|| TrackerError::math(format!("derived price {quotient} exceeds 256 bits"), None))?;

    Ok(FixedPrice::new(value, price_a.decimals))
}

/// `supply / 10^decimals * price`, truncated, at the price's scale.
///
/// # Errors
///
/// Returns a math error if the result exceeds 256 bits.
pub fn market_cap(supply: U256, decimals: u8, price: FixedPrice) -> TrackerResult<FixedPrice> {
    let numerator = U512::from(supply)
        .checked_mul(U512::from(price.value))
        .ok_or_else(|| TrackerError::math("Overflow computing market cap", None))?;
    let quotient = numerator / pow10(decimals)?;
    let value = U256::checked_from_limbs_slice(quotient.as_limbs())
        .ok_or_else(|| TrackerError::math("market cap exceeds 256 bits", None))?;
    Ok(FixedPrice::new(value, price.decimals))
}

/// One side of a pool as seen by the price engine.
#[derive(Debug, Clone, Copy)]
pub struct PoolSide<'a> {
    /// Issuer symbol
    pub symbol: &'a str,
    /// Issuer decimals
    pub decimals: u8,
    /// Raw reserve
    pub reserve: U256,
}

/// Symbol → latest derived price.
///
/// The stable asset is pinned at construction; the native asset is priced by
/// [`PriceBook::update_anchor`]; everything else by [`PriceBook::derive_pool`].
/// Entries are overwritten and never expire.
#[derive(Debug, Clone)]
pub struct PriceBook {
    prices: HashMap<String, FixedPrice>,
}

impl Default for PriceBook {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceBook {
    /// A book holding only the pinned stable price.
    #[must_use]
    pub fn new() -> Self {
        let mut prices = HashMap::new();
        prices.insert(STABLE_SYMBOL.to_string(), FixedPrice::usd(STABLE_PRICE));
        Self { prices }
    }

    /// Latest price of `symbol`, if any.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<FixedPrice> {
        self.prices.get(symbol).copied()
    }

    /// Latest price of `symbol`.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::PriceNotFound`] if `symbol` was never priced.
    pub fn symbol_price(&self, symbol: &str) -> TrackerResult<FixedPrice> {
        self.get(symbol)
            .ok_or_else(|| TrackerError::price_not_found(symbol))
    }

    /// Number of priced symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    /// Whether the book is empty (never true after construction).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// All prices, sorted by symbol.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, FixedPrice)> {
        let mut entries: Vec<_> = self
            .prices
            .iter()
            .map(|(symbol, price)| (symbol.clone(), *price))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Price of `symbol` if it is an anchor asset (stable or native) that
    /// has already been priced.
    fn anchor_price(&self, symbol: &str) -> Option<FixedPrice> {
        if symbol == STABLE_SYMBOL || symbol == NATIVE_SYMBOL {
            self.get(symbol)
        } else {
            None
        }
    }

    /// Reprice the native asset from the anchor pool reserves.
    ///
    /// # Errors
    ///
    /// Propagates [`derive_price`] failures; the previous price is kept.
    pub fn update_anchor(&mut self, reserve_stable: U256, reserve_native: U256) -> TrackerResult<FixedPrice> {
        let price = derive_price(
            reserve_stable,
            STABLE_DECIMALS,
            reserve_native,
            NATIVE_DECIMALS,
            FixedPrice::usd(STABLE_PRICE),
        )?;
        self.prices.insert(NATIVE_SYMBOL.to_string(), price);
        info!(symbol = NATIVE_SYMBOL, price = %price, "Native price updated");
        Ok(price)
    }

    /// Price the unanchored side of a pool when exactly one side is a priced
    /// anchor asset. Returns the symbol written, or `None` when the pool does
    /// not qualify.
    ///
    /// # Errors
    ///
    /// Propagates [`derive_price`] failures; the book is left unchanged.
    pub fn derive_pool(&mut self, side0: PoolSide<'_>, side1: PoolSide<'_>) -> TrackerResult<Option<String>> {
        let (anchored, priced, target) =
            match (self.anchor_price(side0.symbol), self.anchor_price(side1.symbol)) {
                (Some(price), None) => (side0, price, side1),
                (None, Some(price)) => (side1, price, side0),
                _ => return Ok(None),
            };

        let price = derive_price(
            anchored.reserve,
            anchored.decimals,
            target.reserve,
            target.decimals,
            priced,
        )?;
        debug!(
            symbol = target.symbol,
            anchor = anchored.symbol,
            price = %price,
            "Derived price"
        );
        self.prices.insert(target.symbol.to_string(), price);
        Ok(Some(target.symbol.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side(symbol: &str, decimals: u8, reserve: u128) -> PoolSide<'_> {
        PoolSide {
            symbol,
            decimals,
            reserve: U256::from(reserve),
        }
    }

    #[test]
    fn test_derive_price_normalizes_decimals() {
        let usdt = U256::from(1_000_000u128 * 10u128.pow(6));
        let pton = U256::from(500_000u128 * 10u128.pow(9));
        let price = derive_price(usdt, 6, pton, 9, FixedPrice::usd(1_000_000));
        assert_eq!(price.ok(), Some(FixedPrice::usd(2_000_000)));
    }

    #[test]
    fn test_derive_price_truncates() {
        // 1,000,000 jUSDT vs 300,000 pTON: 3.333333... truncated to 3.333333
        let usdt = U256::from(1_000_000u128 * 10u128.pow(6));
        let pton = U256::from(300_000u128 * 10u128.pow(9));
        let price = derive_price(usdt, 6, pton, 9, FixedPrice::usd(1_000_000));
        assert_eq!(price.ok(), Some(FixedPrice::usd(3_333_333)));
    }

    #[test]
    fn test_derived_scale_ignores_target_decimals() {
        // 1000 jUSDT against 500 B, with B declared at 9 and then 18 decimals.
        let usdt = U256::from(1_000u128 * 10u128.pow(6));
        for decimals_b in [9u8, 18] {
            let b = U256::from(500u128) * U256::from(10u64).pow(U256::from(decimals_b));
            let price = derive_price(usdt, 6, b, decimals_b, FixedPrice::usd(1_000_000));
            assert_eq!(price.ok(), Some(FixedPrice::new(U256::from(2_000_000u64), 6)));
        }
    }

    #[test]
    fn test_derive_price_larger_side_a_decimals() {
        // A has 9 decimals, B has 6: B's reserve is scaled up instead.
        let a = U256::from(2_000u128 * 10u128.pow(9));
        let b = U256::from(1_000u128 * 10u128.pow(6));
        let price = derive_price(a, 9, b, 6, FixedPrice::usd(1_500_000));
        assert_eq!(price.ok(), Some(FixedPrice::usd(3_000_000)));
    }

    #[test]
    fn test_derive_price_beyond_u128() {
        let huge = U256::from(u128::MAX) * U256::from(1_000u64);
        let price = derive_price(huge, 9, huge, 9, FixedPrice::usd(1_234_567));
        assert_eq!(price.ok(), Some(FixedPrice::usd(1_234_567)));
    }

    #[test]
    fn test_derive_price_beyond_u256_is_an_error() {
        let result = derive_price(U256::MAX, 9, U256::from(1u64), 9, FixedPrice::usd(2));
        assert!(matches!(result, Err(TrackerError::MathError { .. })));

        let cap = market_cap(U256::MAX, 0, FixedPrice::usd(2));
        assert!(matches!(cap, Err(TrackerError::MathError { .. })));
    }

    #[test]
    fn test_derive_price_zero_reserve() {
        let result = derive_price(U256::from(1u64), 9, U256::ZERO, 9, FixedPrice::usd(1));
        assert!(matches!(result, Err(TrackerError::MathError { .. })));
        let result = derive_price(U256::ZERO, 9, U256::from(1u64), 9, FixedPrice::usd(1));
        assert!(result.is_err());
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(U256::from(2_000_000u64), 6), "2");
        assert_eq!(format_units(U256::from(1_500_000u64), 6), "1.5");
        assert_eq!(format_units(U256::from(42u64), 6), "0.000042");
        assert_eq!(format_units(U256::ZERO, 9), "0");
        assert_eq!(format_units(U256::from(7u64), 0), "7");
    }

    #[test]
    fn test_market_cap() {
        let supply = U256::from(1_000_000u128 * 10u128.pow(9));
        let cap = market_cap(supply, 9, FixedPrice::usd(2_500_000));
        assert_eq!(cap.ok(), Some(FixedPrice::usd(2_500_000_000_000)));
    }

    #[test]
    fn test_book_pins_stable_only() {
        let book = PriceBook::new();
        assert_eq!(book.get(STABLE_SYMBOL), Some(FixedPrice::usd(STABLE_PRICE)));
        assert!(matches!(
            book.symbol_price(NATIVE_SYMBOL),
            Err(TrackerError::PriceNotFound { .. })
        ));
    }

    #[test]
    fn test_anchor_then_dependent_pool() -> TrackerResult<()> {
        let mut book = PriceBook::new();
        let native = book.update_anchor(
            U256::from(5_000_000u128 * 10u128.pow(6)),
            U256::from(1_000_000u128 * 10u128.pow(9)),
        )?;
        assert_eq!(native, FixedPrice::usd(5_000_000));

        // 100 pTON vs 1,000 SCALE: SCALE = 0.5 USD
        let written = book.derive_pool(
            side(NATIVE_SYMBOL, 9, 100 * 10u128.pow(9)),
            side("SCALE", 9, 1_000 * 10u128.pow(9)),
        )?;
        assert_eq!(written.as_deref(), Some("SCALE"));
        assert_eq!(book.symbol_price("SCALE")?, FixedPrice::usd(500_000));
        Ok(())
    }

    #[test]
    fn test_pool_without_exactly_one_anchor_is_skipped() -> TrackerResult<()> {
        let mut book = PriceBook::new();
        let neither = book.derive_pool(side("AAA", 9, 1), side("BBB", 9, 1))?;
        assert_eq!(neither, None);

        // pTON is not priced yet, so only jUSDT counts as anchored.
        let one = book.derive_pool(
            side(NATIVE_SYMBOL, 9, 10u128.pow(9)),
            side(STABLE_SYMBOL, 6, 3 * 10u128.pow(6)),
        )?;
        assert_eq!(one.as_deref(), Some(NATIVE_SYMBOL));

        let both = book.derive_pool(
            side(NATIVE_SYMBOL, 9, 10u128.pow(9)),
            side(STABLE_SYMBOL, 6, 3 * 10u128.pow(6)),
        )?;
        assert_eq!(both, None);
        Ok(())
    }
}
