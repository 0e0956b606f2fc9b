use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::checksum::{ChecksumType, DEFAULT_BYTES_PER_CHECKSUM};
use crate::compression::CompressionAlgorithm;
use crate::encoding::DataBlockEncoding;
use crate::error::{Error, Result};

/// Default block size target: 64 KB of unencoded cell data.
pub const DEFAULT_BLOCK_SIZE: u32 = 64 * 1024;

pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// Write-side settings for a data file.
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// data-block-encoding = "NONE"
/// block-size = 65536
/// compression = "zstd"
/// checksum = "xxh3"
/// include-tags = true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct EncodingConfig {
    pub data_block_encoding: DataBlockEncoding,
    /// Unencoded bytes per block before the writer rolls to a new one.
    pub block_size: u32,
    pub compression: CompressionAlgorithm,
    /// Only used with `compression = "zstd"`.
    pub zstd_level: i32,
    pub checksum: ChecksumType,
    pub bytes_per_checksum: u32,
    /// Write each cell's sequence id.
    pub include_mvcc: bool,
    /// Write each cell's tags.
    pub include_tags: bool,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            data_block_encoding: DataBlockEncoding::None,
            block_size: DEFAULT_BLOCK_SIZE,
            compression: CompressionAlgorithm::None,
            zstd_level: DEFAULT_ZSTD_LEVEL,
            checksum: ChecksumType::Xxh3,
            bytes_per_checksum: DEFAULT_BYTES_PER_CHECKSUM,
            include_mvcc: true,
            include_tags: false,
        }
    }
}

impl EncodingConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::Config("block-size must be greater than zero".into()));
        }
        if self.bytes_per_checksum == 0 {
            return Err(Error::Config("bytes-per-checksum must be greater than zero".into()));
        }
        if !(1..=22).contains(&self.zstd_level) {
            return Err(Error::Config(format!(
                "zstd-level must be within 1..=22, got {}",
                self.zstd_level
            )));
        }
        Ok(())
    }
}
