use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::format::le_u32;

/// Key prefix reserved for entries the file writer adds itself.
pub const RESERVED_PREFIX: &[u8] = b"cellblock.";

pub const LAST_KEY: &[u8] = b"cellblock.last_key";
pub const AVG_KEY_LEN: &[u8] = b"cellblock.avg_key_len";
pub const AVG_VALUE_LEN: &[u8] = b"cellblock.avg_value_len";
pub const MAX_SEQ_ID: &[u8] = b"cellblock.max_seq_id";

/// Sink strategies write file-level metadata into from `save_metadata`.
pub trait MetadataWriter {
    fn append_file_info(&mut self, key: &[u8], value: &[u8]) -> Result<()>;
}

/// Key/value metadata section of a data file.
///
/// Layout: `count:u32` then `(key_len:u32, key, value_len:u32, value)*`,
/// sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileInfo {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl FileInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    /// Writer-side insert that may use reserved keys.
    pub(crate) fn insert_reserved(&mut self, key: &[u8], value: impl Into<Vec<u8>>) {
        self.entries.insert(key.to_vec(), value.into());
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for (k, v) in &self.entries {
            out.extend_from_slice(&(k.len() as u32).to_le_bytes());
            out.extend_from_slice(k);
            out.extend_from_slice(&(v.len() as u32).to_le_bytes());
            out.extend_from_slice(v);
        }
        out
    }

    pub fn from_bytes(mut buf: &[u8]) -> Result<Self> {
        let count = take_u32(&mut buf)?;
        let mut entries = BTreeMap::new();
        for _ in 0..count {
            let key_len = take_u32(&mut buf)? as usize;
            let key = take(&mut buf, key_len)?.to_vec();
            let value_len = take_u32(&mut buf)? as usize;
            let value = take(&mut buf, value_len)?.to_vec();
            entries.insert(key, value);
        }
        if !buf.is_empty() {
            return Err(Error::corrupt(format!("{} trailing bytes after file info", buf.len())));
        }
        Ok(Self { entries })
    }
}

impl MetadataWriter for FileInfo {
    /// Reserved keys are refused; a later write to the same key replaces the earlier one.
    fn append_file_info(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.starts_with(RESERVED_PREFIX) {
            return Err(Error::Config(format!(
                "file info key {:?} uses the reserved prefix",
                String::from_utf8_lossy(key)
            )));
        }
        self.entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }
}

fn take<'a>(buf: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    if buf.len() < n {
        return Err(Error::corrupt("truncated file info"));
    }
    let (head, rest) = buf.split_at(n);
    *buf = rest;
    Ok(head)
}

fn take_u32(buf: &mut &[u8]) -> Result<u32> {
    take(buf, 4).map(le_u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_round_trip_in_key_order() {
        let mut info = FileInfo::new();
        info.append_file_info(b"zeta", b"1").unwrap();
        info.append_file_info(b"alpha", b"").unwrap();
        info.insert_reserved(LAST_KEY, b"row-9".to_vec());

        let parsed = FileInfo::from_bytes(&info.to_bytes()).unwrap();
        assert_eq!(parsed, info);
        let keys: Vec<&[u8]> = parsed.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![&b"alpha"[..], LAST_KEY, &b"zeta"[..]]);
    }

    #[test]
    fn strategies_cannot_write_reserved_keys() {
        let mut info = FileInfo::new();
        assert!(info.append_file_info(MAX_SEQ_ID, b"7").is_err());
        assert!(info.is_empty());
    }
}
