use cellblock_core::compression::{CompressionAlgorithm, Compressor};
use cellblock_core::config::DEFAULT_ZSTD_LEVEL;

/// Zstandard block compressor.
///
/// Each block body is compressed independently at the configured level, so
/// any block can be decompressed without touching its neighbours.
///
/// Best for: cold files, large values, text-like keys.
pub struct ZstdCompressor {
    /// Compression level (1 = fast / larger, 22 = slow / smallest).
    pub level: i32,
}

impl Default for ZstdCompressor {
    fn default() -> Self {
        Self {
            level: DEFAULT_ZSTD_LEVEL,
        }
    }
}

impl ZstdCompressor {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Compressor for ZstdCompressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Zstd
    }

    fn compress(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        let compressed = zstd::bulk::compress(raw, self.level)?;
        Ok(compressed)
    }

    fn decompress(&self, compressed: &[u8], raw_len: usize) -> anyhow::Result<Vec<u8>> {
        // The header's uncompressed size bounds the output buffer.
        let raw = zstd::bulk::decompress(compressed, raw_len)?;
        if raw.len() != raw_len {
            anyhow::bail!("zstd body decoded to {} bytes, expected {raw_len}", raw.len());
        }
        Ok(raw)
    }
}
