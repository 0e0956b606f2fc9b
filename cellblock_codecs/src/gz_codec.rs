use std::io::{Read, Write};

use cellblock_core::compression::{CompressionAlgorithm, Compressor};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

/// Gzip block compressor.
///
/// Slowest of the bundled algorithms; kept for files that must be readable
/// by tools that only speak deflate.
pub struct GzCompressor {
    pub level: Compression,
}

impl Default for GzCompressor {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Compressor for GzCompressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Gz
    }

    fn compress(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 2), self.level);
        encoder.write_all(raw)?;
        Ok(encoder.finish()?)
    }

    fn decompress(&self, compressed: &[u8], raw_len: usize) -> anyhow::Result<Vec<u8>> {
        // One byte past raw_len is enough to tell an oversized stream apart.
        let mut raw = Vec::with_capacity(raw_len);
        GzDecoder::new(compressed)
            .take(raw_len as u64 + 1)
            .read_to_end(&mut raw)?;
        if raw.len() != raw_len {
            anyhow::bail!("gzip body inflates to more or less than the {raw_len} bytes expected");
        }
        Ok(raw)
    }
}
