//! Swap events and their renderings.

use std::fmt;
use std::sync::Arc;

use super::decoder::DecodedSwap;
use crate::address::Address;
use crate::jetton::{TokenIssuerInfo, DEFAULT_DECIMALS};
use crate::pool::PoolSnapshot;
use crate::pricing::{format_units, market_cap, FixedPrice};

/// Number of columns in [`SwapEvent::to_csv`].
pub const CSV_FIELDS: usize = 18;

/// CSV header matching [`SwapEvent::to_csv`].
pub const CSV_HEADER: &str = "hash,timestamp,action,trader,token0_name,token0_symbol,token1_name,\
token1_symbol,amount_in,min_amount_out,token0_price,token1_price,reserve0,reserve1,token0_supply,\
token1_supply,token0_market_cap,token1_market_cap";

/// Direction of a swap relative to the pool's token0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Source jetton is token0
    Buy,
    /// Source jetton is token1
    Sell,
    /// Source issuer or pool symbol unknown
    Unknown,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Unknown => "UNKNOWN",
        })
    }
}

/// A decoded swap enriched with whatever could be resolved.
#[derive(Debug, Clone)]
pub struct SwapEvent {
    /// Decoded transaction fields
    pub swap: DecodedSwap,
    /// Issuer of the jetton sent in
    pub source: Option<Arc<TokenIssuerInfo>>,
    /// Pool state and prices at the time of the swap
    pub pool: Option<PoolSnapshot>,
}

fn price_or_na(price: Option<FixedPrice>) -> String {
    price.map_or_else(|| "N/A".to_string(), |p| p.to_string())
}

fn csv_escape(field: &str) -> String {
    let field = field.replace(['\n', '\r'], " ");
    if field.contains([',', '"']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field
    }
}

impl SwapEvent {
    /// Transaction hash.
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.swap.hash
    }

    /// Pool address the router forwarded to.
    #[must_use]
    pub const fn pool_address(&self) -> &Address {
        &self.swap.pool
    }

    /// [`Action::Buy`] when the source issuer's symbol is the pool's token0.
    #[must_use]
    pub fn action(&self) -> Action {
        let (Some(source), Some(pool)) = (&self.source, &self.pool) else {
            return Action::Unknown;
        };
        let (Some(symbol), Ok(token0)) = (source.symbol.as_deref(), pool.pool.token0_symbol()) else {
            return Action::Unknown;
        };
        if symbol == token0 {
            Action::Buy
        } else {
            Action::Sell
        }
    }

    fn token0(&self) -> Option<&TokenIssuerInfo> {
        self.pool.as_ref()?.pool.token0.as_deref()
    }

    fn token1(&self) -> Option<&TokenIssuerInfo> {
        self.pool.as_ref()?.pool.token1.as_deref()
    }

    fn destination(&self) -> Option<&TokenIssuerInfo> {
        self.pool
            .as_ref()?
            .pool
            .issuer_for_wallet(&self.swap.dst_jetton)
            .map(AsRef::as_ref)
    }

    fn source_symbol(&self) -> &str {
        self.source.as_deref().map_or("unknown", TokenIssuerInfo::symbol_or_unknown)
    }

    fn destination_symbol(&self) -> &str {
        self.destination().map_or("unknown", TokenIssuerInfo::symbol_or_unknown)
    }

    /// Input amount in human units.
    #[must_use]
    pub fn amount_in(&self) -> String {
        let decimals = self
            .source
            .as_deref()
            .map_or(DEFAULT_DECIMALS, TokenIssuerInfo::decimals_or_default);
        format_units(self.swap.input_amount, decimals)
    }

    /// Minimum output in human units.
    #[must_use]
    pub fn min_out(&self) -> String {
        let decimals = self
            .destination()
            .map_or(DEFAULT_DECIMALS, TokenIssuerInfo::decimals_or_default);
        format_units(self.swap.min_out, decimals)
    }

    fn reserves(&self) -> (String, String) {
        let Some(snapshot) = &self.pool else {
            return ("N/A".to_string(), "N/A".to_string());
        };
        let d0 = self.token0().map_or(DEFAULT_DECIMALS, TokenIssuerInfo::decimals_or_default);
        let d1 = self.token1().map_or(DEFAULT_DECIMALS, TokenIssuerInfo::decimals_or_default);
        (
            format_units(snapshot.pool.data.reserve0, d0),
            format_units(snapshot.pool.data.reserve1, d1),
        )
    }

    fn prices(&self) -> (Option<FixedPrice>, Option<FixedPrice>) {
        self.pool
            .as_ref()
            .map_or((None, None), |s| (s.token0_price, s.token1_price))
    }

    /// Which parts of the event could not be resolved, e.g. `pool,source`.
    #[must_use]
    pub fn missing(&self) -> String {
        let mut missing = Vec::new();
        if self.source.is_none() {
            missing.push("source");
        }
        match &self.pool {
            None => missing.push("pool"),
            Some(snapshot) => {
                if snapshot.pool.lp.is_none() {
                    missing.push("lp");
                }
                if snapshot.pool.token0.is_none() {
                    missing.push("token0");
                }
                if snapshot.pool.token1.is_none() {
                    missing.push("token1");
                }
            }
        }
        if missing.is_empty() {
            "complete".to_string()
        } else {
            missing.join(",")
        }
    }

    /// One-line summary.
    #[must_use]
    pub fn pretty(&self) -> String {
        let (r0, r1) = self.reserves();
        let (p0, p1) = self.prices();
        let lp = self
            .pool
            .as_ref()
            .and_then(|s| s.pool.lp_symbol())
            .unwrap_or("unknown");
        format!(
            "{} {} {} for {} {} at TX {} [{}] with pool {} (reserve: {}[$ {}]/{}[$ {}])",
            self.action(),
            self.amount_in(),
            self.source_symbol(),
            self.min_out(),
            self.destination_symbol(),
            self.swap.hash,
            self.missing(),
            lp,
            r0,
            price_or_na(p0),
            r1,
            price_or_na(p1),
        )
    }

    /// One-line summary with trader and pool addresses.
    #[must_use]
    pub fn long_pretty(&self) -> String {
        let (r0, r1) = self.reserves();
        format!(
            "{} {} {} {} to {} {} with pool {} (reserve: {}/{}) at TX {}",
            self.swap.trader.short(),
            self.action(),
            self.amount_in(),
            self.source_symbol(),
            self.min_out(),
            self.destination_symbol(),
            self.swap.pool.short(),
            r0,
            r1,
            self.swap.hash,
        )
    }

    /// Multi-line dump of every field.
    #[must_use]
    pub fn verbose(&self) -> String {
        let (r0, r1) = self.reserves();
        let (p0, p1) = self.prices();
        let payout = self
            .swap
            .payout
            .map_or_else(|| "none".to_string(), |a| a.to_string());
        let mut out = format!(
            "Swap {hash}\n  time:      {now} (lt {lt})\n  action:    {action}\n  trader:    {trader}\n  \
             payout:    {payout}\n  in:        {amount_in} {src} (wallet {src_wallet})\n  \
             min out:   {min_out} {dst} (wallet {dst_wallet})\n  pool:      {pool}\n  \
             reserves:  {r0} / {r1}\n  prices:    {p0} / {p1}\n  missing:   {missing}",
            hash = self.swap.hash,
            now = self.swap.now,
            lt = self.swap.lt,
            action = self.action(),
            trader = self.swap.trader,
            amount_in = self.amount_in(),
            src = self.source_symbol(),
            src_wallet = self.swap.src_jetton,
            min_out = self.min_out(),
            dst = self.destination_symbol(),
            dst_wallet = self.swap.dst_jetton,
            pool = self.swap.pool,
            p0 = price_or_na(p0),
            p1 = price_or_na(p1),
            missing = self.missing(),
        );
        for (label, token) in [("token0", self.token0()), ("token1", self.token1())] {
            if let Some(token) = token {
                out.push_str(&format!(
                    "\n  {label}:    {} ({}) master {} supply {}",
                    token.symbol_or_unknown(),
                    token.name_or_unknown(),
                    token.address,
                    format_units(token.total_supply, token.decimals_or_default()),
                ));
            }
        }
        out
    }

    /// Market cap of `token` at `price`, empty when either is unknown.
    fn market_cap_of(token: Option<&TokenIssuerInfo>, price: Option<FixedPrice>) -> String {
        let (Some(token), Some(price)) = (token, price) else {
            return String::new();
        };
        market_cap(token.total_supply, token.decimals_or_default(), price)
            .map(|cap| cap.to_string())
            .unwrap_or_default()
    }

    /// Comma-separated record with [`CSV_FIELDS`] columns, see [`CSV_HEADER`].
    ///
    /// Unknown numeric values are empty; unknown names are `unknown`.
    #[must_use]
    pub fn to_csv(&self) -> String {
        let token0 = self.token0();
        let token1 = self.token1();
        let (p0, p1) = self.prices();
        let (r0, r1) = match &self.pool {
            Some(_) => self.reserves(),
            None => (String::new(), String::new()),
        };
        let supply = |t: Option<&TokenIssuerInfo>| {
            t.map(|t| format_units(t.total_supply, t.decimals_or_default()))
                .unwrap_or_default()
        };
        let fields = [
            self.swap.hash.clone(),
            self.swap.now.to_string(),
            self.action().to_string(),
            self.swap.trader.to_string(),
            token0.map_or("unknown", TokenIssuerInfo::name_or_unknown).to_string(),
            token0.map_or("unknown", TokenIssuerInfo::symbol_or_unknown).to_string(),
            token1.map_or("unknown", TokenIssuerInfo::name_or_unknown).to_string(),
            token1.map_or("unknown", TokenIssuerInfo::symbol_or_unknown).to_string(),
            self.amount_in(),
            self.min_out(),
            p0.map(|p| p.to_string()).unwrap_or_default(),
            p1.map(|p| p.to_string()).unwrap_or_default(),
            r0,
            r1,
            supply(token0),
            supply(token1),
            Self::market_cap_of(token0, p0),
            Self::market_cap_of(token1, p1),
        ];
        fields.iter().map(|f| csv_escape(f)).collect::<Vec<_>>().join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::StackValue;
    use crate::pool::{PoolData, PoolState};
    use alloy::primitives::U256;

    fn addr(byte: u8) -> Address {
        Address::new(0, [byte; 32])
    }

    fn issuer(symbol: &str, name: &str, decimals: u8, supply: u64) -> Arc<TokenIssuerInfo> {
        Arc::new(TokenIssuerInfo {
            address: addr(0xaa),
            total_supply: U256::from(supply),
            symbol: Some(symbol.to_string()),
            name: Some(name.to_string()),
            decimals: Some(decimals),
            ..TokenIssuerInfo::default()
        })
    }

    fn swap() -> DecodedSwap {
        DecodedSwap {
            hash: "abc=".to_string(),
            lt: 1,
            now: 1_700_000_000,
            query_id: 0,
            input_amount: U256::from(1_500_000u64),
            trader: addr(3),
            src_jetton: addr(1),
            dst_jetton: addr(2),
            min_out: U256::from(2_000_000_000u64),
            payout: None,
            pool: addr(9),
        }
    }

    fn snapshot() -> PoolSnapshot {
        PoolSnapshot {
            pool: PoolState {
                address: addr(9),
                lp: Some(TokenIssuerInfo {
                    symbol: Some("jUSDT-pTON LP".to_string()),
                    ..TokenIssuerInfo::default()
                }),
                token0: Some(issuer("jUSDT", "Tether, bridged", 6, 10_000_000)),
                token1: Some(issuer("pTON", "Proxy TON", 9, 5_000_000_000)),
                data: PoolData {
                    reserve0: U256::from(4_000_000u64),
                    reserve1: U256::from(2_000_000_000u64),
                    token0_wallet: addr(1),
                    token1_wallet: addr(2),
                    lp_fee: 20,
                    protocol_fee: 10,
                    ref_fee: 10,
                    reserved: StackValue::Null,
                    collected_token0_protocol_fee: U256::ZERO,
                    collected_token1_protocol_fee: U256::ZERO,
                },
            },
            token0_price: Some(FixedPrice::usd(1_000_000)),
            token1_price: Some(FixedPrice::usd(2_000_000)),
        }
    }

    fn event() -> SwapEvent {
        SwapEvent {
            swap: swap(),
            source: Some(issuer("jUSDT", "Tether, bridged", 6, 10_000_000)),
            pool: Some(snapshot()),
        }
    }

    #[test]
    fn test_action() {
        assert_eq!(event().action(), Action::Buy);

        let mut sell = event();
        sell.source = Some(issuer("pTON", "Proxy TON", 9, 1));
        assert_eq!(sell.action(), Action::Sell);

        let mut unknown = event();
        unknown.pool = None;
        assert_eq!(unknown.action(), Action::Unknown);
    }

    #[test]
    fn test_amounts_use_side_decimals() {
        let e = event();
        assert_eq!(e.amount_in(), "1.5");
        assert_eq!(e.min_out(), "2");
    }

    #[test]
    fn test_amounts_fall_back_to_default_decimals() {
        let e = SwapEvent {
            swap: swap(),
            source: None,
            pool: None,
        };
        assert_eq!(e.amount_in(), "0.0015");
        assert_eq!(e.missing(), "source,pool");
    }

    #[test]
    fn test_pretty() {
        let line = event().pretty();
        assert!(line.starts_with("BUY 1.5 jUSDT for 2 pTON at TX abc="), "{line}");
        assert!(line.contains("[complete]"));
        assert!(line.contains("(reserve: 4[$ 1]/2[$ 2])"), "{line}");
    }

    #[test]
    fn test_csv_has_all_fields_and_quotes_commas() {
        let line = event().to_csv();
        assert!(line.contains("\"Tether, bridged\""));
        let unquoted = line.replace("\"Tether, bridged\"", "x");
        assert_eq!(unquoted.split(',').count(), CSV_FIELDS);
        assert_eq!(CSV_HEADER.split(',').count(), CSV_FIELDS);
        // 5 pTON supply at $2
        assert!(line.ends_with(",10,5,10,10"), "{line}");
    }
}
