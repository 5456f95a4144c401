//! Transaction filter and payload decoder.
//!
//! A swap through the STON.fi router shows up on the router account as:
//!
//! ```text
//! in:  transfer_notification#7362d09c query_id:uint64 amount:Coins sender:MsgAddress
//!        ^[ swap#25938561 token_wallet1:MsgAddress min_out:Coins to_address:MsgAddress has_ref:uint1 ]
//! out: swap#25938561 query_id:uint64 to_address:MsgAddress sender_address:MsgAddress ...
//! ```
//!
//! [`decode_transaction`] runs the whole filter and decode step without
//! touching the network. Pattern mismatches are [`Rejection`]s; malformed
//! payloads that do match the pattern are decoding errors naming the field.

use std::fmt;

use alloy::primitives::U256;
use tracing::debug;

use crate::address::Address;
use crate::cell::CellSlice;
use crate::chain::Transaction;
use crate::error::{TrackerError, TrackerResult};

/// Jetton `transfer_notification` opcode.
pub const OP_TRANSFER_NOTIFICATION: u32 = 0x7362_d09c;

/// STON.fi `swap` opcode, used both inside the forward payload and on the
/// router → pool message.
pub const OP_SWAP: u32 = 0x2593_8561;

/// Why a transaction is not a swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No inbound message.
    NoInboundMessage,
    /// Not exactly one outbound message.
    OutboundCount(usize),
    /// Inbound opcode differs (or the body is shorter than 32 bits).
    InboundOpcode(Option<u32>),
    /// Outbound opcode differs (or the body is shorter than 32 bits).
    OutboundOpcode(Option<u32>),
    /// Forward payload opcode is not `swap`.
    SwapIntentOpcode(u32),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = |op: &Option<u32>| op.map_or_else(|| "none".to_string(), |op| format!("{op:#010x}"));
        match self {
            Self::NoInboundMessage => write!(f, "no inbound message"),
            Self::OutboundCount(n) => write!(f, "{n} outbound messages, expected 1"),
            Self::InboundOpcode(got) => write!(f, "inbound op {} is not transfer_notification", op(got)),
            Self::OutboundOpcode(got) => write!(f, "outbound op {} is not swap", op(got)),
            Self::SwapIntentOpcode(got) => write!(f, "forward payload op {got:#010x} is not swap"),
        }
    }
}

/// Swap parameters extracted from one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSwap {
    /// Transaction hash
    pub hash: String,
    /// Logical time
    pub lt: u64,
    /// Unix timestamp
    pub now: u32,
    /// Inbound query id
    pub query_id: u64,
    /// Jetton amount sent in
    pub input_amount: U256,
    /// Account that initiated the swap
    pub trader: Address,
    /// Router's wallet of the jetton sent in (inbound source)
    pub src_jetton: Address,
    /// Router's wallet of the jetton asked for
    pub dst_jetton: Address,
    /// Minimum output accepted
    pub min_out: U256,
    /// Where the output is paid
    pub payout: Option<Address>,
    /// Pool the router forwards to (outbound destination)
    pub pool: Address,
}

/// Result of filtering and decoding one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The transaction is a swap.
    Accept(DecodedSwap),
    /// The transaction is something else.
    Reject(Rejection),
}

fn peek_op(slice: &CellSlice) -> Option<u32> {
    slice.clone().load_u32().ok()
}

/// Filter `tx` and, if it matches the swap pattern, decode it.
///
/// # Errors
///
/// Returns a decoding error naming the field when a matching transaction
/// has a malformed payload.
pub fn decode_transaction(tx: &Transaction) -> TrackerResult<Decision> {
    let Some(in_msg) = &tx.in_msg else {
        return Ok(Decision::Reject(Rejection::NoInboundMessage));
    };
    let [out_msg] = tx.out_msgs.as_slice() else {
        return Ok(Decision::Reject(Rejection::OutboundCount(tx.out_msgs.len())));
    };

    let mut inbound = in_msg.body();
    let mut outbound = out_msg.body();
    let in_op = peek_op(&inbound);
    if in_op != Some(OP_TRANSFER_NOTIFICATION) {
        return Ok(Decision::Reject(Rejection::InboundOpcode(in_op)));
    }
    let out_op = peek_op(&outbound);
    if out_op != Some(OP_SWAP) {
        return Ok(Decision::Reject(Rejection::OutboundOpcode(out_op)));
    }
    inbound.load_u32()?;
    outbound.load_u32()?;

    let field = |name: &'static str| move |e: TrackerError| e.in_field(name);

    let query_id = inbound.load_u64().map_err(field("query_id"))?;
    let input_amount = inbound.load_coins().map_err(field("amount"))?;
    let trader = inbound.load_required_address().map_err(field("sender"))?;
    let mut payload = inbound.load_ref().map_err(field("forward_payload"))?;
    debug!(hash = %tx.hash, query_id, %input_amount, %trader, "Inbound notification decoded");

    let intent = payload.load_u32().map_err(field("swap op"))?;
    if intent != OP_SWAP {
        return Ok(Decision::Reject(Rejection::SwapIntentOpcode(intent)));
    }
    let dst_jetton = payload.load_required_address().map_err(field("token_wallet1"))?;
    let min_out = payload.load_coins().map_err(field("min_out"))?;
    let payout = payload.load_address().map_err(field("to_address"))?;
    let _has_ref = payload.load_bit().map_err(field("has_ref"))?;
    debug!(hash = %tx.hash, %dst_jetton, %min_out, "Swap intent decoded");

    let out_query_id = outbound.load_u64().map_err(field("outbound query_id"))?;
    let recipient = outbound.load_address().map_err(field("outbound to_address"))?;
    let sender = outbound.load_address().map_err(field("outbound sender_address"))?;
    debug!(hash = %tx.hash, out_query_id, ?recipient, ?sender, "Router swap decoded");

    let src_jetton = in_msg
        .source
        .ok_or_else(|| TrackerError::decoding("inbound source: external message", None))?;
    let pool = out_msg
        .destination
        .ok_or_else(|| TrackerError::decoding("outbound destination: missing", None))?;

    Ok(Decision::Accept(DecodedSwap {
        hash: tx.hash.clone(),
        lt: tx.lt,
        now: tx.now,
        query_id,
        input_amount,
        trader,
        src_jetton,
        dst_jetton,
        min_out,
        payout,
        pool,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{Cell, CellBuilder};
    use crate::chain::Message;
    use std::sync::Arc;

    fn addr(byte: u8) -> Address {
        Address::new(0, [byte; 32])
    }

    fn notification(intent: u32) -> TrackerResult<Cell> {
        let payload = CellBuilder::new()
            .store_uint(u64::from(intent), 32)?
            .store_address(Some(&addr(4)))?
            .store_coins(U256::from(123_456u64))?
            .store_address(Some(&addr(5)))?
            .store_bit(false)?
            .build()?;
        CellBuilder::new()
            .store_uint(u64::from(OP_TRANSFER_NOTIFICATION), 32)?
            .store_uint(7, 64)?
            .store_coins(U256::from(10u64).pow(U256::from(30u64)))?
            .store_address(Some(&addr(3)))?
            .store_bit(true)?
            .store_ref(payload)?
            .build()
    }

    fn router_swap(op: u32) -> TrackerResult<Cell> {
        CellBuilder::new()
            .store_uint(u64::from(op), 32)?
            .store_uint(7, 64)?
            .store_address(Some(&addr(5)))?
            .store_address(Some(&addr(3)))?
            .build()
    }

    fn message(source: u8, destination: u8, body: Cell) -> Message {
        Message {
            source: Some(addr(source)),
            destination: Some(addr(destination)),
            body: Arc::new(body),
        }
    }

    fn tx(inbound: Cell, outbound: Vec<Cell>) -> Transaction {
        Transaction {
            hash: "dGVzdA==".to_string(),
            lt: 42,
            now: 1_700_000_000,
            in_msg: Some(message(1, 2, inbound)),
            out_msgs: outbound.into_iter().map(|body| message(2, 9, body)).collect(),
        }
    }

    #[test]
    fn test_decodes_fixture_exactly() -> TrackerResult<()> {
        let decision = decode_transaction(&tx(notification(OP_SWAP)?, vec![router_swap(OP_SWAP)?]))?;
        let Decision::Accept(swap) = decision else {
            return Err(TrackerError::state(format!("rejected: {decision:?}"), None));
        };
        assert_eq!(swap.query_id, 7);
        assert_eq!(swap.input_amount, U256::from(10u64).pow(U256::from(30u64)));
        assert_eq!(swap.trader, addr(3));
        assert_eq!(swap.src_jetton, addr(1));
        assert_eq!(swap.dst_jetton, addr(4));
        assert_eq!(swap.min_out, U256::from(123_456u64));
        assert_eq!(swap.payout, Some(addr(5)));
        assert_eq!(swap.pool, addr(9));
        assert_eq!(swap.lt, 42);
        Ok(())
    }

    #[test]
    fn test_opcode_mismatches_reject() -> TrackerResult<()> {
        let wrong_in = CellBuilder::new().store_uint(0x0f8a_7ea5, 32)?.build()?;
        let decision = decode_transaction(&tx(wrong_in, vec![router_swap(OP_SWAP)?]))?;
        assert_eq!(decision, Decision::Reject(Rejection::InboundOpcode(Some(0x0f8a_7ea5))));

        let decision = decode_transaction(&tx(notification(OP_SWAP)?, vec![router_swap(0xdead_beef)?]))?;
        assert_eq!(decision, Decision::Reject(Rejection::OutboundOpcode(Some(0xdead_beef))));

        let decision = decode_transaction(&tx(notification(0x1234_5678)?, vec![router_swap(OP_SWAP)?]))?;
        assert_eq!(decision, Decision::Reject(Rejection::SwapIntentOpcode(0x1234_5678)));
        Ok(())
    }

    #[test]
    fn test_outbound_count_and_short_body() -> TrackerResult<()> {
        let decision = decode_transaction(&tx(notification(OP_SWAP)?, Vec::new()))?;
        assert_eq!(decision, Decision::Reject(Rejection::OutboundCount(0)));

        let decision = decode_transaction(&tx(Cell::default(), vec![router_swap(OP_SWAP)?]))?;
        assert_eq!(decision, Decision::Reject(Rejection::InboundOpcode(None)));

        let mut no_in = tx(notification(OP_SWAP)?, vec![router_swap(OP_SWAP)?]);
        no_in.in_msg = None;
        assert_eq!(decode_transaction(&no_in)?, Decision::Reject(Rejection::NoInboundMessage));
        Ok(())
    }

    #[test]
    fn test_truncated_payload_names_field() -> TrackerResult<()> {
        let truncated = CellBuilder::new()
            .store_uint(u64::from(OP_TRANSFER_NOTIFICATION), 32)?
            .store_uint(7, 64)?
            .build()?;
        let err = decode_transaction(&tx(truncated, vec![router_swap(OP_SWAP)?]))
            .err()
            .map(|e| e.to_string())
            .unwrap_or_default();
        assert!(err.contains("amount"), "unexpected error: {err}");
        Ok(())
    }
}
