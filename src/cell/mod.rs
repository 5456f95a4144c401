//! TVM cells and a sequential cursor over them.
//!
//! Every message body on TON is a tree of cells: up to 1023 data bits and
//! up to four references to child cells. [`CellSlice`] reads a cell front to
//! back (unsigned integers, `Coins`, `MsgAddress`, references) and is cheap
//! to clone, so a decoder can peek at an opcode on a copy and hand the
//! original to a background task.
//!
//! [`CellBuilder`] is the write side, used to assemble payloads in tests.
//!
//! ```
//! use alloy::primitives::U256;
//! use ton_swap_watcher::cell::CellBuilder;
//!
//! # fn main() -> ton_swap_watcher::error::TrackerResult<()> {
//! let cell = CellBuilder::new()
//!     .store_uint(0x7362_d09c, 32)?
//!     .store_coins(U256::from(1_000_000_000u64))?
//!     .build()?;
//!
//! let mut slice = cell.into_slice();
//! assert_eq!(slice.load_u32()?, 0x7362_d09c);
//! assert_eq!(slice.load_coins()?, U256::from(1_000_000_000u64));
//! # Ok(())
//! # }
//! ```

pub mod boc;
pub mod dict;

use std::sync::Arc;

use alloy::primitives::U256;

use crate::address::Address;
use crate::error::{TrackerError, TrackerResult};

/// Maximum number of data bits in one cell.
pub const MAX_CELL_BITS: usize = 1023;

/// Maximum number of references in one cell.
pub const MAX_CELL_REFS: usize = 4;

/// An immutable cell: data bits plus child references.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cell {
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<Arc<Cell>>,
}

impl Cell {
    /// Create a cell from raw parts.
    ///
    /// # Errors
    ///
    /// Returns a decoding error if the cell exceeds the size limits or `data`
    /// is too short for `bit_len`.
    pub fn new(data: Vec<u8>, bit_len: usize, refs: Vec<Arc<Self>>) -> TrackerResult<Self> {
        if bit_len > MAX_CELL_BITS {
            return Err(TrackerError::decoding(
                format!("cell has {bit_len} bits, limit is {MAX_CELL_BITS}"),
                None,
            ));
        }
        if refs.len() > MAX_CELL_REFS {
            return Err(TrackerError::decoding(
                format!("cell has {} refs, limit is {MAX_CELL_REFS}", refs.len()),
                None,
            ));
        }
        if data.len() * 8 < bit_len {
            return Err(TrackerError::decoding(
                format!("cell data holds {} bits, {bit_len} declared", data.len() * 8),
                None,
            ));
        }
        Ok(Self {
            data,
            bit_len,
            refs,
        })
    }

    /// Number of data bits.
    #[must_use]
    pub const fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Child references.
    #[must_use]
    pub fn refs(&self) -> &[Arc<Self>] {
        &self.refs
    }

    /// Start reading this cell from the beginning.
    #[must_use]
    pub fn into_slice(self) -> CellSlice {
        CellSlice::new(Arc::new(self))
    }

    fn bit(&self, index: usize) -> bool {
        (self.data[index / 8] >> (7 - index % 8)) & 1 == 1
    }
}

/// Sequential reader over a cell.
#[derive(Debug, Clone)]
pub struct CellSlice {
    cell: Arc<Cell>,
    bit_pos: usize,
    ref_pos: usize,
}

impl CellSlice {
    /// Start reading `cell` from the beginning.
    #[must_use]
    pub fn new(cell: Arc<Cell>) -> Self {
        Self {
            cell,
            bit_pos: 0,
            ref_pos: 0,
        }
    }

    /// Data bits not yet consumed.
    #[must_use]
    pub fn remaining_bits(&self) -> usize {
        self.cell.bit_len - self.bit_pos
    }

    /// References not yet consumed.
    #[must_use]
    pub fn remaining_refs(&self) -> usize {
        self.cell.refs.len() - self.ref_pos
    }

    fn ensure_bits(&self, bits: usize) -> TrackerResult<()> {
        if bits > self.remaining_bits() {
            return Err(TrackerError::decoding(
                format!(
                    "cell underflow: need {bits} bits, {} left",
                    self.remaining_bits()
                ),
                None,
            ));
        }
        Ok(())
    }

    /// Read one bit.
    ///
    /// # Errors
    ///
    /// Returns a decoding error when the cell is exhausted.
    pub fn load_bit(&mut self) -> TrackerResult<bool> {
        self.ensure_bits(1)?;
        let bit = self.cell.bit(self.bit_pos);
        self.bit_pos += 1;
        Ok(bit)
    }

    /// Read an unsigned big-endian integer of up to 64 bits.
    ///
    /// # Errors
    ///
    /// Returns a decoding error on underflow or when `bits > 64`.
    pub fn load_uint(&mut self, bits: usize) -> TrackerResult<u64> {
        if bits > 64 {
            return Err(TrackerError::decoding(
                format!("load_uint supports at most 64 bits, asked for {bits}"),
                None,
            ));
        }
        self.ensure_bits(bits)?;
        let mut value = 0u64;
        for _ in 0..bits {
            value = (value << 1) | u64::from(self.cell.bit(self.bit_pos));
            self.bit_pos += 1;
        }
        Ok(value)
    }

    /// Read a 32-bit unsigned integer (opcodes).
    ///
    /// # Errors
    ///
    /// Returns a decoding error on underflow.
    #[allow(clippy::cast_possible_truncation)]
    pub fn load_u32(&mut self) -> TrackerResult<u32> {
        self.load_uint(32).map(|v| v as u32)
    }

    /// Read a 64-bit unsigned integer (query ids).
    ///
    /// # Errors
    ///
    /// Returns a decoding error on underflow.
    pub fn load_u64(&mut self) -> TrackerResult<u64> {
        self.load_uint(64)
    }

    /// Read a two's complement signed integer of up to 64 bits.
    ///
    /// # Errors
    ///
    /// Returns a decoding error on underflow or when `bits` is 0 or above 64.
    #[allow(clippy::cast_possible_wrap)]
    pub fn load_int(&mut self, bits: usize) -> TrackerResult<i64> {
        if bits == 0 {
            return Err(TrackerError::decoding("load_int needs at least 1 bit", None));
        }
        let raw = self.load_uint(bits)?;
        let shift = 64 - bits;
        Ok(((raw << shift) as i64) >> shift)
    }

    /// Read an unsigned big-endian integer of up to 256 bits.
    ///
    /// # Errors
    ///
    /// Returns a decoding error on underflow or when `bits > 256`.
    pub fn load_big_uint(&mut self, bits: usize) -> TrackerResult<U256> {
        if bits > 256 {
            return Err(TrackerError::decoding(
                format!("load_big_uint supports at most 256 bits, asked for {bits}"),
                None,
            ));
        }
        self.ensure_bits(bits)?;
        let mut value = U256::ZERO;
        for _ in 0..bits {
            value = (value << 1usize) | U256::from(u8::from(self.cell.bit(self.bit_pos)));
            self.bit_pos += 1;
        }
        Ok(value)
    }

    /// Read `Coins` (`VarUInteger 16`): a 4-bit byte length then the value.
    ///
    /// # Errors
    ///
    /// Returns a decoding error on underflow.
    pub fn load_coins(&mut self) -> TrackerResult<U256> {
        #[allow(clippy::cast_possible_truncation)]
        let len = self.load_uint(4)? as usize;
        self.load_big_uint(len * 8)
    }

    /// Read `n` whole bytes.
    ///
    /// # Errors
    ///
    /// Returns a decoding error on underflow.
    #[allow(clippy::cast_possible_truncation)]
    pub fn load_bytes(&mut self, n: usize) -> TrackerResult<Vec<u8>> {
        self.ensure_bits(n * 8)?;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.load_uint(8)? as u8);
        }
        Ok(out)
    }

    /// Read all remaining whole bytes.
    ///
    /// # Errors
    ///
    /// Returns a decoding error if the remaining bit count is not a multiple of 8.
    pub fn load_remaining_bytes(&mut self) -> TrackerResult<Vec<u8>> {
        let bits = self.remaining_bits();
        if bits % 8 != 0 {
            return Err(TrackerError::decoding(
                format!("{bits} remaining bits are not byte aligned"),
                None,
            ));
        }
        self.load_bytes(bits / 8)
    }

    /// Read a `MsgAddress`.
    ///
    /// Returns `None` for `addr_none`. Only `addr_std` is accepted otherwise;
    /// an anycast prefix is consumed and ignored.
    ///
    /// # Errors
    ///
    /// Returns a decoding error on underflow, for external addresses and for
    /// `addr_var`.
    pub fn load_address(&mut self) -> TrackerResult<Option<Address>> {
        match self.load_uint(2)? {
            0b00 => Ok(None),
            0b10 => {
                if self.load_bit()? {
                    #[allow(clippy::cast_possible_truncation)]
                    let depth = self.load_uint(5)? as usize;
                    self.ensure_bits(depth)?;
                    self.bit_pos += depth;
                }
                #[allow(clippy::cast_possible_truncation)]
                let workchain = self.load_int(8)? as i8;
                let hash: [u8; 32] = self
                    .load_bytes(32)?
                    .try_into()
                    .map_err(|_| TrackerError::decoding("address hash is not 32 bytes", None))?;
                Ok(Some(Address::new(workchain, hash)))
            }
            0b01 => Err(TrackerError::decoding("unexpected external address", None)),
            _ => Err(TrackerError::decoding("addr_var is not supported", None)),
        }
    }

    /// Read a `MsgAddress` that must not be `addr_none`.
    ///
    /// # Errors
    ///
    /// Returns a decoding error for `addr_none` or any [`Self::load_address`] failure.
    pub fn load_required_address(&mut self) -> TrackerResult<Address> {
        self.load_address()?
            .ok_or_else(|| TrackerError::decoding("address is addr_none", None))
    }

    /// Descend into the next reference.
    ///
    /// # Errors
    ///
    /// Returns a decoding error when no references are left.
    pub fn load_ref(&mut self) -> TrackerResult<Self> {
        let child = self
            .cell
            .refs
            .get(self.ref_pos)
            .cloned()
            .ok_or_else(|| TrackerError::decoding("cell has no more references", None))?;
        self.ref_pos += 1;
        Ok(Self::new(child))
    }

    /// Read a snake-encoded byte string: this cell's remaining bytes followed
    /// by the first reference chain.
    ///
    /// # Errors
    ///
    /// Returns a decoding error on misaligned data.
    pub fn load_snake_bytes(&mut self) -> TrackerResult<Vec<u8>> {
        let mut out = self.load_remaining_bytes()?;
        let mut next = if self.remaining_refs() > 0 {
            Some(self.load_ref()?)
        } else {
            None
        };
        while let Some(mut slice) = next {
            out.extend(slice.load_remaining_bytes()?);
            next = if slice.remaining_refs() > 0 {
                Some(slice.load_ref()?)
            } else {
                None
            };
        }
        Ok(out)
    }
}

/// Incremental cell writer.
#[derive(Debug, Clone, Default)]
pub struct CellBuilder {
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<Arc<Cell>>,
}

impl CellBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one bit.
    ///
    /// # Errors
    ///
    /// Returns a decoding error on cell overflow.
    pub fn store_bit(mut self, bit: bool) -> TrackerResult<Self> {
        if self.bit_len >= MAX_CELL_BITS {
            return Err(TrackerError::decoding("cell overflow", None));
        }
        if self.bit_len % 8 == 0 {
            self.data.push(0);
        }
        if bit {
            let last = self.data.len() - 1;
            self.data[last] |= 1 << (7 - self.bit_len % 8);
        }
        self.bit_len += 1;
        Ok(self)
    }

    /// Append the low `bits` bits of `value`, most significant first.
    ///
    /// # Errors
    ///
    /// Returns a decoding error on overflow or if `value` does not fit.
    pub fn store_uint(mut self, value: u64, bits: usize) -> TrackerResult<Self> {
        if bits > 64 || (bits < 64 && value >> bits != 0) {
            return Err(TrackerError::decoding(
                format!("{value} does not fit in {bits} bits"),
                None,
            ));
        }
        for i in (0..bits).rev() {
            self = self.store_bit((value >> i) & 1 == 1)?;
        }
        Ok(self)
    }

    /// Append the low `bits` bits of a 256-bit value.
    ///
    /// # Errors
    ///
    /// Returns a decoding error on overflow or if `value` does not fit.
    pub fn store_big_uint(mut self, value: U256, bits: usize) -> TrackerResult<Self> {
        if bits > 256 || value.bit_len() > bits {
            return Err(TrackerError::decoding(
                format!("{value} does not fit in {bits} bits"),
                None,
            ));
        }
        for i in (0..bits).rev() {
            self = self.store_bit(value.bit(i))?;
        }
        Ok(self)
    }

    /// Append `Coins` (`VarUInteger 16`).
    ///
    /// # Errors
    ///
    /// Returns a decoding error if the amount needs more than 15 bytes.
    pub fn store_coins(self, amount: U256) -> TrackerResult<Self> {
        let len = amount.bit_len().div_ceil(8);
        if len > 15 {
            return Err(TrackerError::decoding(
                format!("{amount} exceeds the Coins range"),
                None,
            ));
        }
        self.store_uint(len as u64, 4)?.store_big_uint(amount, len * 8)
    }

    /// Append whole bytes.
    ///
    /// # Errors
    ///
    /// Returns a decoding error on overflow.
    pub fn store_bytes(mut self, bytes: &[u8]) -> TrackerResult<Self> {
        for byte in bytes {
            self = self.store_uint(u64::from(*byte), 8)?;
        }
        Ok(self)
    }

    /// Append a `MsgAddress` (`addr_none` for `None`, `addr_std` otherwise).
    ///
    /// # Errors
    ///
    /// Returns a decoding error on overflow.
    pub fn store_address(self, address: Option<&Address>) -> TrackerResult<Self> {
        match address {
            None => self.store_uint(0, 2),
            Some(addr) => {
                #[allow(clippy::cast_sign_loss)]
                let workchain = addr.workchain() as u8;
                self.store_uint(0b100, 3)?
                    .store_uint(u64::from(workchain), 8)?
                    .store_bytes(addr.hash())
            }
        }
    }

    /// Append a reference to `cell`.
    ///
    /// # Errors
    ///
    /// Returns a decoding error when four references are already stored.
    pub fn store_ref(mut self, cell: Cell) -> TrackerResult<Self> {
        if self.refs.len() >= MAX_CELL_REFS {
            return Err(TrackerError::decoding("too many references", None));
        }
        self.refs.push(Arc::new(cell));
        Ok(self)
    }

    /// Append a byte string in snake format, spilling into child cells.
    ///
    /// # Errors
    ///
    /// Returns a decoding error if this builder cannot take another reference.
    pub fn store_snake_bytes(self, bytes: &[u8]) -> TrackerResult<Self> {
        let room = (MAX_CELL_BITS - self.bit_len) / 8;
        if bytes.len() <= room {
            return self.store_bytes(bytes);
        }
        let (head, tail) = bytes.split_at(room);
        let child = Self::new().store_snake_bytes(tail)?.build()?;
        self.store_bytes(head)?.store_ref(child)
    }

    /// Finish the cell.
    ///
    /// # Errors
    ///
    /// Propagates [`Cell::new`] validation.
    pub fn build(self) -> TrackerResult<Cell> {
        Cell::new(self.data, self.bit_len, self.refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_address(byte: u8) -> Address {
        Address::new(0, [byte; 32])
    }

    #[test]
    fn test_uint_round_trip() -> TrackerResult<()> {
        let cell = CellBuilder::new()
            .store_uint(0x2593_8561, 32)?
            .store_uint(0xdead_beef_cafe_babe, 64)?
            .store_bit(true)?
            .build()?;
        let mut slice = cell.into_slice();
        assert_eq!(slice.load_u32()?, 0x2593_8561);
        assert_eq!(slice.load_u64()?, 0xdead_beef_cafe_babe);
        assert!(slice.load_bit()?);
        assert_eq!(slice.remaining_bits(), 0);
        Ok(())
    }

    #[test]
    fn test_coins_beyond_u64() -> TrackerResult<()> {
        let big = U256::from(u128::MAX >> 8);
        let cell = CellBuilder::new().store_coins(big)?.build()?;
        assert_eq!(cell.into_slice().load_coins()?, big);
        Ok(())
    }

    #[test]
    fn test_zero_coins_is_four_bits() -> TrackerResult<()> {
        let cell = CellBuilder::new().store_coins(U256::ZERO)?.build()?;
        assert_eq!(cell.bit_len(), 4);
        assert_eq!(cell.into_slice().load_coins()?, U256::ZERO);
        Ok(())
    }

    #[test]
    fn test_address_and_none() -> TrackerResult<()> {
        let addr = Address::new(-1, [7u8; 32]);
        let cell = CellBuilder::new()
            .store_address(Some(&addr))?
            .store_address(None)?
            .build()?;
        let mut slice = cell.into_slice();
        assert_eq!(slice.load_address()?, Some(addr));
        assert_eq!(slice.load_address()?, None);
        Ok(())
    }

    #[test]
    fn test_required_address_rejects_none() -> TrackerResult<()> {
        let cell = CellBuilder::new().store_address(None)?.build()?;
        assert!(cell.into_slice().load_required_address().is_err());
        Ok(())
    }

    #[test]
    fn test_underflow_is_error() -> TrackerResult<()> {
        let cell = CellBuilder::new().store_uint(1, 8)?.build()?;
        let mut slice = cell.into_slice();
        let err = slice.load_u32();
        assert!(matches!(err, Err(TrackerError::DecodingError { .. })));
        Ok(())
    }

    #[test]
    fn test_refs_and_clone_independence() -> TrackerResult<()> {
        let child = CellBuilder::new()
            .store_address(Some(&sample_address(3)))?
            .build()?;
        let cell = CellBuilder::new().store_uint(5, 3)?.store_ref(child)?.build()?;
        let mut slice = cell.into_slice();
        let mut peek = slice.clone();
        assert_eq!(peek.load_uint(3)?, 5);
        assert_eq!(slice.remaining_bits(), 3);

        slice.load_uint(3)?;
        let mut inner = slice.load_ref()?;
        assert_eq!(inner.load_required_address()?, sample_address(3));
        assert!(slice.load_ref().is_err());
        Ok(())
    }

    #[test]
    fn test_signed_int() -> TrackerResult<()> {
        let cell = CellBuilder::new().store_uint(0xff, 8)?.build()?;
        assert_eq!(cell.into_slice().load_int(8)?, -1);
        Ok(())
    }

    #[test]
    fn test_snake_spans_cells() -> TrackerResult<()> {
        let text = "https://example.org/".repeat(20);
        let cell = CellBuilder::new().store_snake_bytes(text.as_bytes())?.build()?;
        assert_eq!(cell.refs().len(), 1);
        assert_eq!(cell.into_slice().load_snake_bytes()?, text.as_bytes());
        Ok(())
    }

    #[test]
    fn test_store_uint_rejects_wide_value() {
        assert!(CellBuilder::new().store_uint(256, 8).is_err());
    }
}
