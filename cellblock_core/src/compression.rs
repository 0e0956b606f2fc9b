use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ── Compression IDs ────────────────────────────────────────────────────────

pub const COMPRESSION_NONE: u8 = 0;
pub const COMPRESSION_GZ: u8 = 1;
pub const COMPRESSION_LZ4: u8 = 2;
pub const COMPRESSION_ZSTD: u8 = 3;

/// Block compression algorithm, stored by id in the file trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    #[default]
    None,
    Gz,
    Lz4,
    Zstd,
}

impl CompressionAlgorithm {
    pub fn id(self) -> u8 {
        match self {
            CompressionAlgorithm::None => COMPRESSION_NONE,
            CompressionAlgorithm::Gz => COMPRESSION_GZ,
            CompressionAlgorithm::Lz4 => COMPRESSION_LZ4,
            CompressionAlgorithm::Zstd => COMPRESSION_ZSTD,
        }
    }

    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            COMPRESSION_NONE => Ok(CompressionAlgorithm::None),
            COMPRESSION_GZ => Ok(CompressionAlgorithm::Gz),
            COMPRESSION_LZ4 => Ok(CompressionAlgorithm::Lz4),
            COMPRESSION_ZSTD => Ok(CompressionAlgorithm::Zstd),
            _ => Err(Error::corrupt(format!("unknown compression id {id}"))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CompressionAlgorithm::None => "none",
            CompressionAlgorithm::Gz => "gz",
            CompressionAlgorithm::Lz4 => "lz4",
            CompressionAlgorithm::Zstd => "zstd",
        }
    }
}

impl fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CompressionAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "pass" => Ok(CompressionAlgorithm::None),
            "gz" | "gzip" => Ok(CompressionAlgorithm::Gz),
            "lz4" => Ok(CompressionAlgorithm::Lz4),
            "zstd" | "z" => Ok(CompressionAlgorithm::Zstd),
            other => Err(Error::Config(format!(
                "unknown compression '{other}'; valid options: none, gz, lz4, zstd"
            ))),
        }
    }
}

/// Block compression abstraction.
///
/// Applied by the encoding context to the body of a finished block (never to
/// the header) and reversed by the decoding context. Each block is compressed
/// independently; no state carries over between blocks.
pub trait Compressor: Send + Sync {
    /// Algorithm identity recorded in the file trailer.
    fn algorithm(&self) -> CompressionAlgorithm;

    /// Human-readable name for CLI display.
    fn name(&self) -> &'static str {
        self.algorithm().name()
    }

    fn compress(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>>;

    /// `raw_len` is the uncompressed size recorded in the block header.
    fn decompress(&self, compressed: &[u8], raw_len: usize) -> anyhow::Result<Vec<u8>>;
}
