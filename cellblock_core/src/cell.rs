use std::cmp::Ordering;
use std::io::{self, Write};

use crate::error::{Error, Result};

/// One key-value record stored in a data block.
///
/// Serialized form, little endian:
/// ```text
/// key_len:u32 | value_len:u32 | key | value
/// [tags_len:u16 | tags]     ← only when the file includes tags
/// [sequence_id:varint]      ← only when the file includes MVCC data
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cell {
    key: Vec<u8>,
    value: Vec<u8>,
    tags: Vec<u8>,
    sequence_id: u64,
}

impl Cell {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn with_tags(mut self, tags: impl Into<Vec<u8>>) -> Self {
        self.tags = tags.into();
        self
    }

    pub fn with_sequence_id(mut self, sequence_id: u64) -> Self {
        self.sequence_id = sequence_id;
        self
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn tags(&self) -> &[u8] {
        &self.tags
    }

    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    /// Bytes `write_to` produces for this cell under the given flags.
    pub fn serialized_len(&self, include_tags: bool, include_mvcc: bool) -> usize {
        let mut len = 8 + self.key.len() + self.value.len();
        if include_tags {
            len += 2 + self.tags.len();
        }
        if include_mvcc {
            len += varint_len(self.sequence_id);
        }
        len
    }

    /// Write the serialized form, returning the number of bytes written.
    ///
    /// Length limits are checked before anything reaches `out`, and the cell
    /// is handed to `out` in a single `write_all`.
    pub fn write_to<W: Write + ?Sized>(
        &self,
        out: &mut W,
        include_tags: bool,
        include_mvcc: bool,
    ) -> io::Result<usize> {
        let key_len = u32::try_from(self.key.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "key longer than u32::MAX"))?;
        let value_len = u32::try_from(self.value.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "value longer than u32::MAX"))?;
        let tags_len = if include_tags {
            Some(
                u16::try_from(self.tags.len())
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "tags longer than u16::MAX"))?,
            )
        } else {
            None
        };

        let mut buf = Vec::with_capacity(self.serialized_len(include_tags, include_mvcc));
        buf.extend_from_slice(&key_len.to_le_bytes());
        buf.extend_from_slice(&value_len.to_le_bytes());
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);
        if let Some(tags_len) = tags_len {
            buf.extend_from_slice(&tags_len.to_le_bytes());
            buf.extend_from_slice(&self.tags);
        }
        if include_mvcc {
            let mut varint = [0u8; 10];
            let n = encode_varint(self.sequence_id, &mut varint);
            buf.extend_from_slice(&varint[..n]);
        }

        out.write_all(&buf)?;
        Ok(buf.len())
    }

    /// Read one serialized cell from the front of `buf`, advancing it.
    pub fn read_from(buf: &mut &[u8], include_tags: bool, include_mvcc: bool) -> Result<Self> {
        let key_len = take_u32(buf)? as usize;
        let value_len = take_u32(buf)? as usize;
        let key = take(buf, key_len)?.to_vec();
        let value = take(buf, value_len)?.to_vec();

        let tags = if include_tags {
            let tags_len = u16::from_le_bytes(take(buf, 2)?.try_into().map_err(|_| short_cell())?);
            take(buf, tags_len as usize)?.to_vec()
        } else {
            Vec::new()
        };
        let sequence_id = if include_mvcc { decode_varint(buf)? } else { 0 };

        Ok(Self {
            key,
            value,
            tags,
            sequence_id,
        })
    }
}

/// Ordering used to validate the sequence of cells appended to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum CellComparator {
    /// Key bytes ascending, then sequence id descending (newest first).
    #[default]
    Bytewise,
}

impl CellComparator {
    pub fn compare(&self, a: &Cell, b: &Cell) -> Ordering {
        match self {
            CellComparator::Bytewise => a
                .key
                .cmp(&b.key)
                .then_with(|| b.sequence_id.cmp(&a.sequence_id)),
        }
    }
}

// ── helpers ────────────────────────────────────────────────────────────────

fn short_cell() -> Error {
    Error::corrupt("truncated cell in block body")
}

fn take<'a>(buf: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    if buf.len() < n {
        return Err(short_cell());
    }
    let (head, rest) = buf.split_at(n);
    *buf = rest;
    Ok(head)
}

fn take_u32(buf: &mut &[u8]) -> Result<u32> {
    let bytes = take(buf, 4)?;
    Ok(u32::from_le_bytes(bytes.try_into().map_err(|_| short_cell())?))
}

/// Unsigned LEB128.
pub(crate) fn encode_varint(mut v: u64, buf: &mut [u8; 10]) -> usize {
    let mut i = 0;
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            buf[i] = byte;
            return i + 1;
        }
        buf[i] = byte | 0x80;
        i += 1;
    }
}

pub(crate) fn varint_len(v: u64) -> usize {
    let bits = 64 - v.leading_zeros() as usize;
    bits.max(1).div_ceil(7)
}

pub(crate) fn decode_varint(buf: &mut &[u8]) -> Result<u64> {
    let mut value = 0u64;
    for shift in (0..64).step_by(7) {
        let byte = take(buf, 1)?[0];
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(Error::corrupt("varint longer than 10 bytes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_len_matches_encoding() {
        for v in [0u64, 1, 127, 128, 16_383, 16_384, u32::MAX as u64, u64::MAX] {
            let mut buf = [0u8; 10];
            let n = encode_varint(v, &mut buf);
            assert_eq!(n, varint_len(v), "length for {v}");
            let mut slice = &buf[..n];
            assert_eq!(decode_varint(&mut slice).unwrap(), v);
            assert!(slice.is_empty());
        }
    }

    #[test]
    fn serialized_len_matches_bytes_written() {
        let cell = Cell::new("row-1", "value").with_tags(vec![1, 2, 3]).with_sequence_id(300);
        for (tags, mvcc) in [(false, false), (true, false), (false, true), (true, true)] {
            let mut out = Vec::new();
            let n = cell.write_to(&mut out, tags, mvcc).unwrap();
            assert_eq!(n, out.len());
            assert_eq!(n, cell.serialized_len(tags, mvcc));
        }
    }

    #[test]
    fn oversized_tags_write_nothing() {
        let cell = Cell::new("b", "2").with_tags(vec![0u8; 70_000]);
        let mut out = b"prefix".to_vec();
        let err = cell.write_to(&mut out, true, true).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert_eq!(out, b"prefix");
        // Tags are not limited when they are not stored.
        assert!(cell.write_to(&mut out, false, true).is_ok());
    }

    #[test]
    fn truncated_cell_is_corrupt() {
        let mut out = Vec::new();
        Cell::new("k", "v").write_to(&mut out, false, false).unwrap();
        let mut short = &out[..out.len() - 1];
        assert!(matches!(
            Cell::read_from(&mut short, false, false),
            Err(Error::Corrupt(_))
        ));
    }

    #[test]
    fn newer_sequence_sorts_first_for_equal_keys() {
        let cmp = CellComparator::Bytewise;
        let old = Cell::new("a", "1").with_sequence_id(1);
        let new = Cell::new("a", "2").with_sequence_id(2);
        assert_eq!(cmp.compare(&new, &old), Ordering::Less);
        assert_eq!(cmp.compare(&Cell::new("a", ""), &Cell::new("b", "")), Ordering::Less);
    }
}
