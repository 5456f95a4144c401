//! `HashmapE` dictionaries with fixed-width keys.
//!
//! On-chain jetton metadata is a `HashmapE 256` keyed by `sha256(name)`.
//! Keys come back packed most-significant-bit first; values are left as
//! slices positioned just after the edge label.

use super::{Cell, CellBuilder, CellSlice};
use crate::error::{TrackerError, TrackerResult};

/// Width of a `#<= max` field.
const fn len_width(max: usize) -> usize {
    (usize::BITS - max.leading_zeros()) as usize
}

fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut out = vec![0u8; bits.len().div_ceil(8)];
    for (i, bit) in bits.iter().enumerate() {
        if *bit {
            out[i / 8] |= 1 << (7 - i % 8);
        }
    }
    out
}

fn unpack_bits(bytes: &[u8], key_bits: usize) -> Vec<bool> {
    (0..key_bits)
        .map(|i| bytes.get(i / 8).is_some_and(|b| (b >> (7 - i % 8)) & 1 == 1))
        .collect()
}

/// Read a `HashmapE key_bits` from the current position of `slice`.
///
/// # Errors
///
/// Returns a decoding error for malformed labels or missing fork references.
pub fn load_dict(slice: &mut CellSlice, key_bits: usize) -> TrackerResult<Vec<(Vec<u8>, CellSlice)>> {
    if !slice.load_bit()? {
        return Ok(Vec::new());
    }
    let root = slice.load_ref()?;
    let mut entries = Vec::new();
    load_edge(root, key_bits, Vec::with_capacity(key_bits), &mut entries)?;
    Ok(entries)
}

fn load_edge(
    mut slice: CellSlice,
    remaining: usize,
    mut prefix: Vec<bool>,
    out: &mut Vec<(Vec<u8>, CellSlice)>,
) -> TrackerResult<()> {
    let label = load_label(&mut slice, remaining)?;
    prefix.extend(&label);
    let rest = remaining - label.len();

    if rest == 0 {
        out.push((pack_bits(&prefix), slice));
        return Ok(());
    }

    let left = slice.load_ref()?;
    let right = slice.load_ref()?;
    let mut left_prefix = prefix.clone();
    left_prefix.push(false);
    load_edge(left, rest - 1, left_prefix, out)?;
    prefix.push(true);
    load_edge(right, rest - 1, prefix, out)
}

fn load_label(slice: &mut CellSlice, max: usize) -> TrackerResult<Vec<bool>> {
    let label = if !slice.load_bit()? {
        let mut len = 0;
        while slice.load_bit()? {
            len += 1;
        }
        check_label(len, max)?;
        (0..len).map(|_| slice.load_bit()).collect::<TrackerResult<Vec<_>>>()?
    } else if !slice.load_bit()? {
        #[allow(clippy::cast_possible_truncation)]
        let len = slice.load_uint(len_width(max))? as usize;
        check_label(len, max)?;
        (0..len).map(|_| slice.load_bit()).collect::<TrackerResult<Vec<_>>>()?
    } else {
        let bit = slice.load_bit()?;
        #[allow(clippy::cast_possible_truncation)]
        let len = slice.load_uint(len_width(max))? as usize;
        check_label(len, max)?;
        vec![bit; len]
    };
    Ok(label)
}

fn check_label(len: usize, max: usize) -> TrackerResult<()> {
    if len > max {
        return Err(TrackerError::decoding(
            format!("dictionary label of {len} bits exceeds remaining {max}"),
            None,
        ));
    }
    Ok(())
}

impl CellBuilder {
    /// Append a `HashmapE key_bits ^Cell`: each value is stored as a reference.
    ///
    /// # Errors
    ///
    /// Returns a decoding error for duplicate keys or cell overflow.
    pub fn store_dict_of_refs(self, key_bits: usize, entries: Vec<(Vec<u8>, Cell)>) -> TrackerResult<Self> {
        if entries.is_empty() {
            return self.store_bit(false);
        }
        let keyed = entries
            .into_iter()
            .map(|(key, value)| (unpack_bits(&key, key_bits), value))
            .collect();
        let root = build_edge(keyed, key_bits)?;
        self.store_bit(true)?.store_ref(root)
    }
}

fn build_edge(mut entries: Vec<(Vec<bool>, Cell)>, remaining: usize) -> TrackerResult<Cell> {
    let common = entries
        .iter()
        .skip(1)
        .fold(remaining, |len, (key, _)| {
            key.iter()
                .zip(&entries[0].0)
                .take(len)
                .take_while(|(a, b)| a == b)
                .count()
        });
    let label = entries[0].0[..common].to_vec();

    let mut builder = CellBuilder::new()
        .store_uint(0b10, 2)?
        .store_uint(common as u64, len_width(remaining))?;
    for bit in &label {
        builder = builder.store_bit(*bit)?;
    }

    let rest = remaining - common;
    if rest == 0 {
        if entries.len() > 1 {
            return Err(TrackerError::decoding("duplicate dictionary key", None));
        }
        let (_, value) = entries.remove(0);
        return builder.store_ref(value)?.build();
    }

    let (right, left): (Vec<_>, Vec<_>) = entries
        .into_iter()
        .map(|(key, value)| (key[common..].to_vec(), value))
        .partition(|(key, _)| key[0]);
    let strip = |side: Vec<(Vec<bool>, Cell)>| {
        side.into_iter()
            .map(|(key, value)| (key[1..].to_vec(), value))
            .collect::<Vec<_>>()
    };
    builder
        .store_ref(build_edge(strip(left), rest - 1)?)?
        .store_ref(build_edge(strip(right), rest - 1)?)?
        .build()
}
