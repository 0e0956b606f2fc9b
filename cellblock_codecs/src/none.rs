use cellblock_core::compression::{CompressionAlgorithm, Compressor};

/// Stores block bodies verbatim.
///
/// Useful for:
/// - Verifying the format round-trip independently of any compressor.
/// - Cell data that is already compressed, where another pass would expand it.
pub struct NoCompression;

impl Compressor for NoCompression {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::None
    }

    fn compress(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(raw.to_vec())
    }

    fn decompress(&self, compressed: &[u8], raw_len: usize) -> anyhow::Result<Vec<u8>> {
        if compressed.len() != raw_len {
            anyhow::bail!(
                "uncompressed body is {} bytes but {} were expected",
                compressed.len(),
                raw_len
            );
        }
        Ok(compressed.to_vec())
    }
}
