//! Bag-of-cells deserialization.
//!
//! toncenter returns message bodies and get-method cells as base64 BOC
//! (`b5ee9c72` serialization). Only the first root is materialized.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::Cell;
use crate::error::{TrackerError, TrackerResult};

const BOC_MAGIC: [u8; 4] = [0xb5, 0xee, 0x9c, 0x72];

/// Byte reader with underflow reported as a decoding error.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> TrackerResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| TrackerError::decoding("truncated bag of cells", None))?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    const fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn byte(&mut self) -> TrackerResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn uint(&mut self, width: usize) -> TrackerResult<usize> {
        Ok(self
            .take(width)?
            .iter()
            .fold(0usize, |acc, b| (acc << 8) | usize::from(*b)))
    }
}

struct RawCell {
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<usize>,
}

/// Deserialize a bag of cells and return its first root.
///
/// # Errors
///
/// Returns a decoding error on a bad magic, truncated input, a header that
/// declares more cells than the input can hold, forward references that
/// break topological order, or an invalid cell.
pub fn deserialize(bytes: &[u8]) -> TrackerResult<Arc<Cell>> {
    let mut r = Reader::new(bytes);
    if r.take(4)? != BOC_MAGIC {
        return Err(TrackerError::decoding("not a bag of cells", None));
    }

    let flags = r.byte()?;
    let has_idx = flags & 0x80 != 0;
    let ref_size = usize::from(flags & 0x07);
    let off_size = usize::from(r.byte()?);
    if ref_size == 0 || off_size == 0 {
        return Err(TrackerError::decoding("bag of cells has zero-width fields", None));
    }
    if off_size > 8 {
        return Err(TrackerError::decoding(format!("bag of cells offset width {off_size} exceeds 8 bytes"), None));
    }

    let cell_count = r.uint(ref_size)?;
    let root_count = r.uint(ref_size)?;
    let _absent = r.uint(ref_size)?;
    let _total_size = r.uint(off_size)?;
    if root_count == 0 {
        return Err(TrackerError::decoding("bag of cells has no roots", None));
    }

    let root = r.uint(ref_size)?;
    for _ in 1..root_count {
        r.uint(ref_size)?;
    }
    if has_idx {
        let index_len = cell_count
            .checked_mul(off_size)
            .ok_or_else(|| TrackerError::decoding("bag of cells index size overflows", None))?;
        r.take(index_len)?;
    }

    // Every cell takes at least its two descriptor bytes.
    if cell_count > r.remaining() / 2 {
        return Err(TrackerError::decoding(
            format!("bag of cells declares {cell_count} cells in {} bytes", r.remaining()),
            None,
        ));
    }

    let mut raw = Vec::with_capacity(cell_count);
    for index in 0..cell_count {
        raw.push(read_cell(&mut r, ref_size, index, cell_count)?);
    }

    // Children always follow their parents, so build back to front.
    let mut built: Vec<Option<Arc<Cell>>> = vec![None; cell_count];
    for index in (0..cell_count).rev() {
        let RawCell {
            data,
            bit_len,
            refs,
        } = std::mem::replace(
            &mut raw[index],
            RawCell {
                data: Vec::new(),
                bit_len: 0,
                refs: Vec::new(),
            },
        );
        let children = refs
            .iter()
            .map(|child| {
                built[*child]
                    .clone()
                    .ok_or_else(|| TrackerError::decoding("dangling cell reference", None))
            })
            .collect::<TrackerResult<Vec<_>>>()?;
        built[index] = Some(Arc::new(Cell::new(data, bit_len, children)?));
    }

    built
        .get(root)
        .cloned()
        .flatten()
        .ok_or_else(|| TrackerError::decoding(format!("root index {root} out of range"), None))
}

/// Deserialize a base64-encoded bag of cells.
///
/// # Errors
///
/// Returns a decoding error for invalid base64 or any [`deserialize`] failure.
pub fn deserialize_base64(encoded: &str) -> TrackerResult<Arc<Cell>> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| TrackerError::decoding("invalid base64 bag of cells", Some(Box::new(e))))?;
    deserialize(&bytes)
}

fn read_cell(
    r: &mut Reader<'_>,
    ref_size: usize,
    index: usize,
    cell_count: usize,
) -> TrackerResult<RawCell> {
    let d1 = r.byte()?;
    let d2 = r.byte()?;
    let ref_count = usize::from(d1 & 0x07);
    let with_hashes = d1 & 0x10 != 0;
    let level_mask = d1 >> 5;

    if with_hashes {
        let hash_count = level_mask.count_ones() as usize + 1;
        r.take(hash_count * (32 + 2))?;
    }

    let data_len = usize::from(d2).div_ceil(2);
    let mut data = r.take(data_len)?.to_vec();
    let bit_len = if d2 % 2 == 0 {
        data_len * 8
    } else {
        let last = data.last().copied().unwrap_or(0);
        if last == 0 {
            return Err(TrackerError::decoding(
                format!("cell {index} is missing its completion tag"),
                None,
            ));
        }
        let tag = last.trailing_zeros() as usize;
        if let Some(byte) = data.last_mut() {
            *byte &= !(1u8 << tag);
        }
        data_len * 8 - tag - 1
    };

    let mut refs = Vec::with_capacity(ref_count);
    for _ in 0..ref_count {
        let child = r.uint(ref_size)?;
        if child <= index || child >= cell_count {
            return Err(TrackerError::decoding(
                format!("cell {index} references cell {child} out of order"),
                None,
            ));
        }
        refs.push(child);
    }

    Ok(RawCell {
        data,
        bit_len,
        refs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_cell() -> TrackerResult<()> {
        let bytes = [
            0xb5, 0xee, 0x9c, 0x72, 0x01, 0x01, 0x01, 0x01, 0x00, 0x03, 0x00, 0x00, 0x02, 0xab,
        ];
        let cell = deserialize(&bytes)?;
        assert_eq!(cell.bit_len(), 8);
        let mut slice = crate::cell::CellSlice::new(cell);
        assert_eq!(slice.load_uint(8)?, 0xab);
        Ok(())
    }

    #[test]
    fn test_completion_tag_and_ref() -> TrackerResult<()> {
        let bytes = [
            0xb5, 0xee, 0x9c, 0x72, 0x01, 0x01, 0x02, 0x01, 0x00, 0x07, 0x00, 0x01, 0x01, 0xa8,
            0x01, 0x00, 0x02, 0xff,
        ];
        let cell = deserialize(&bytes)?;
        assert_eq!(cell.bit_len(), 4);
        assert_eq!(cell.refs().len(), 1);

        let mut slice = crate::cell::CellSlice::new(cell);
        assert_eq!(slice.load_uint(4)?, 0b1010);
        assert_eq!(slice.load_ref()?.load_uint(8)?, 0xff);
        Ok(())
    }

    #[test]
    fn test_base64_input() -> TrackerResult<()> {
        let encoded = STANDARD.encode([
            0xb5, 0xee, 0x9c, 0x72, 0x01, 0x01, 0x01, 0x01, 0x00, 0x03, 0x00, 0x00, 0x02, 0xab,
        ]);
        assert_eq!(deserialize_base64(&encoded)?.bit_len(), 8);
        Ok(())
    }

    #[test]
    fn test_bad_magic() {
        let err = deserialize(&[0, 1, 2, 3, 4, 5]);
        assert!(matches!(err, Err(TrackerError::DecodingError { .. })));
    }

    #[test]
    fn test_truncated() {
        let bytes = [0xb5, 0xee, 0x9c, 0x72, 0x01, 0x01, 0x01, 0x01, 0x00, 0x03, 0x00, 0x00];
        assert!(deserialize(&bytes).is_err());
    }

    #[test]
    fn test_oversized_cell_count_rejected() {
        let bytes = [
            0xb5, 0xee, 0x9c, 0x72, 0x04, 0x01, 0x7f, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x01,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        let err = deserialize(&bytes);
        assert!(matches!(err, Err(TrackerError::DecodingError { .. })));
    }

    #[test]
    fn test_backward_reference_rejected() {
        let bytes = [
            0xb5, 0xee, 0x9c, 0x72, 0x01, 0x01, 0x02, 0x01, 0x00, 0x07, 0x00, 0x01, 0x01, 0xa8,
            0x00, 0x00, 0x02, 0xff,
        ];
        assert!(deserialize(&bytes).is_err());
    }
}
