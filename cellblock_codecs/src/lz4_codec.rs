use cellblock_core::compression::{CompressionAlgorithm, Compressor};
use lz4_flex::block::decompress;
use lz4_flex::compress_prepend_size;

/// LZ4 block compressor.
///
/// Fastest decompression of the bundled algorithms. Best for hot files where
/// blocks are read often and decode speed matters more than size.
pub struct Lz4Compressor;

impl Compressor for Lz4Compressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Lz4
    }

    fn compress(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(compress_prepend_size(raw))
    }

    /// The prepended size must agree with `raw_len`; the output buffer is
    /// sized from `raw_len`, never from the stream.
    fn decompress(&self, compressed: &[u8], raw_len: usize) -> anyhow::Result<Vec<u8>> {
        let (prefix, body) = compressed
            .split_first_chunk::<4>()
            .ok_or_else(|| anyhow::anyhow!("lz4 body of {} bytes has no size prefix", compressed.len()))?;
        let prepended = u32::from_le_bytes(*prefix) as usize;
        if prepended != raw_len {
            anyhow::bail!("lz4 body claims {prepended} bytes but {raw_len} were expected");
        }
        let raw = decompress(body, raw_len).map_err(|e| anyhow::anyhow!("lz4 decompress error: {}", e))?;
        if raw.len() != raw_len {
            anyhow::bail!("lz4 body decoded to {} bytes, expected {raw_len}", raw.len());
        }
        Ok(raw)
    }
}
