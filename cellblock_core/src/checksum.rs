use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

use crate::error::{Error, Result};

/// Bytes per stored checksum value.
pub const CHECKSUM_SIZE: usize = 8;

/// Default chunk size covered by one checksum: 16 KB.
pub const DEFAULT_BYTES_PER_CHECKSUM: u32 = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumType {
    /// No checksums are written or verified.
    Null,
    /// xxhash3-64 per `bytes_per_checksum` chunk.
    #[default]
    Xxh3,
}

impl ChecksumType {
    pub fn code(self) -> u8 {
        match self {
            ChecksumType::Null => 0,
            ChecksumType::Xxh3 => 1,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(ChecksumType::Null),
            1 => Ok(ChecksumType::Xxh3),
            _ => Err(Error::corrupt(format!("unknown checksum type {code}"))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChecksumType::Null => "null",
            ChecksumType::Xxh3 => "xxh3",
        }
    }

    /// Number of checksum bytes trailing a block whose header + body is `data_len` bytes.
    pub fn checksum_bytes(self, data_len: usize, bytes_per_checksum: u32) -> usize {
        match self {
            ChecksumType::Null => 0,
            ChecksumType::Xxh3 => data_len.div_ceil(bytes_per_checksum as usize) * CHECKSUM_SIZE,
        }
    }

    /// Append one checksum per chunk of `data` to `out`.
    pub fn generate(self, data: &[u8], bytes_per_checksum: u32, out: &mut Vec<u8>) {
        if self == ChecksumType::Null {
            return;
        }
        for chunk in data.chunks(bytes_per_checksum as usize) {
            out.extend_from_slice(&xxh3_64(chunk).to_le_bytes());
        }
    }

    /// Check `checksums` against `data`; the first bad chunk is reported.
    pub fn verify(self, data: &[u8], bytes_per_checksum: u32, checksums: &[u8]) -> Result<()> {
        if self == ChecksumType::Null {
            return Ok(());
        }
        let expected_len = self.checksum_bytes(data.len(), bytes_per_checksum);
        if checksums.len() != expected_len {
            return Err(Error::corrupt(format!(
                "expected {expected_len} checksum bytes, found {}",
                checksums.len()
            )));
        }
        let stored = checksums.chunks_exact(CHECKSUM_SIZE);
        for (idx, (chunk, stored)) in data.chunks(bytes_per_checksum as usize).zip(stored).enumerate() {
            let computed = xxh3_64(chunk);
            let stored = u64::from_le_bytes(stored.try_into().map_err(|_| Error::corrupt("short checksum"))?);
            if computed != stored {
                return Err(Error::corrupt(format!(
                    "checksum mismatch in chunk {idx}: expected {stored:016x}, got {computed:016x}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_checksum_per_started_chunk() {
        let data = vec![7u8; 100];
        let mut out = Vec::new();
        ChecksumType::Xxh3.generate(&data, 32, &mut out);
        assert_eq!(out.len(), 4 * CHECKSUM_SIZE);
        assert_eq!(ChecksumType::Xxh3.checksum_bytes(data.len(), 32), out.len());
        ChecksumType::Xxh3.verify(&data, 32, &out).unwrap();
    }

    #[test]
    fn flipped_byte_is_detected() {
        let mut data = vec![1u8; 64];
        let mut sums = Vec::new();
        ChecksumType::Xxh3.generate(&data, 16, &mut sums);
        data[40] ^= 0xff;
        let err = ChecksumType::Xxh3.verify(&data, 16, &sums).unwrap_err();
        assert!(err.to_string().contains("chunk 2"), "{err}");
    }

    #[test]
    fn null_checksums_are_empty() {
        let mut out = Vec::new();
        ChecksumType::Null.generate(b"abc", 16, &mut out);
        assert!(out.is_empty());
        ChecksumType::Null.verify(b"abc", 16, &[]).unwrap();
    }
}
