mod gz_codec;
mod lz4_codec;
mod none;
mod zstd_codec;

pub use gz_codec::GzCompressor;
pub use lz4_codec::Lz4Compressor;
pub use none::NoCompression;
pub use zstd_codec::ZstdCompressor;

use cellblock_core::compression::{CompressionAlgorithm, Compressor};
use cellblock_core::config::{EncodingConfig, DEFAULT_ZSTD_LEVEL};
use std::sync::Arc;

/// Resolve a compressor for `algorithm`. `zstd_level` only applies to zstd.
pub fn compressor_for(algorithm: CompressionAlgorithm, zstd_level: i32) -> Arc<dyn Compressor> {
    match algorithm {
        CompressionAlgorithm::None => Arc::new(NoCompression),
        CompressionAlgorithm::Gz => Arc::new(GzCompressor::default()),
        CompressionAlgorithm::Lz4 => Arc::new(Lz4Compressor),
        CompressionAlgorithm::Zstd => Arc::new(ZstdCompressor::new(zstd_level)),
    }
}

/// Compressor named by a write-side config.
pub fn compressor_from_config(config: &EncodingConfig) -> Arc<dyn Compressor> {
    compressor_for(config.compression, config.zstd_level)
}

/// Resolve a compressor from its on-disk id.
///
/// Called when opening an existing file, so the reader can be initialized
/// with the right compressor automatically.
pub fn compressor_by_id(id: u8) -> anyhow::Result<Arc<dyn Compressor>> {
    let algorithm = CompressionAlgorithm::from_id(id)?;
    Ok(compressor_for(algorithm, DEFAULT_ZSTD_LEVEL))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        let pattern = b"row-00042/cf:qualifier=value ";
        (0..8192).map(|i| pattern[i % pattern.len()]).collect()
    }

    #[test]
    fn every_algorithm_restores_the_body() {
        let raw = sample();
        for algorithm in [
            CompressionAlgorithm::None,
            CompressionAlgorithm::Gz,
            CompressionAlgorithm::Lz4,
            CompressionAlgorithm::Zstd,
        ] {
            let c = compressor_for(algorithm, DEFAULT_ZSTD_LEVEL);
            assert_eq!(c.algorithm(), algorithm);
            let packed = c.compress(&raw).unwrap();
            if algorithm != CompressionAlgorithm::None {
                assert!(packed.len() < raw.len(), "{algorithm} should shrink repetitive input");
            }
            assert_eq!(c.decompress(&packed, raw.len()).unwrap(), raw, "{algorithm}");
        }
    }

    #[test]
    fn wrong_raw_len_is_rejected() {
        let raw = sample();
        for algorithm in [
            CompressionAlgorithm::None,
            CompressionAlgorithm::Gz,
            CompressionAlgorithm::Lz4,
            CompressionAlgorithm::Zstd,
        ] {
            let c = compressor_for(algorithm, DEFAULT_ZSTD_LEVEL);
            let packed = c.compress(&raw).unwrap();
            assert!(c.decompress(&packed, raw.len() - 1).is_err(), "{algorithm} with a short raw_len");
            assert!(c.decompress(&packed, raw.len() + 1).is_err(), "{algorithm} with a long raw_len");
        }
    }

    /// A tiny stream that inflates far past its declared size stops at the bound.
    #[test]
    fn gzip_bomb_is_cut_off() {
        let c = compressor_for(CompressionAlgorithm::Gz, DEFAULT_ZSTD_LEVEL);
        let packed = c.compress(&vec![0u8; 1 << 20]).unwrap();
        assert!(packed.len() < 4096);
        let err = c.decompress(&packed, 16).unwrap_err();
        assert!(err.to_string().contains("16 bytes expected"), "got {err}");
    }

    #[test]
    fn lz4_without_size_prefix_is_rejected() {
        let c = compressor_for(CompressionAlgorithm::Lz4, DEFAULT_ZSTD_LEVEL);
        assert!(c.decompress(&[0x10, 0x00], 0).is_err());
    }

    #[test]
    fn unknown_id_is_rejected() {
        assert!(compressor_by_id(9).is_err());
        assert_eq!(compressor_by_id(3).unwrap().algorithm(), CompressionAlgorithm::Zstd);
    }
}
