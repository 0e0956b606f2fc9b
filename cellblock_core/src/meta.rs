use std::fmt;
use std::sync::Arc;

use crate::cell::CellComparator;
use crate::checksum::{ChecksumType, DEFAULT_BYTES_PER_CHECKSUM};
use crate::compression::Compressor;
use crate::config::{EncodingConfig, DEFAULT_BLOCK_SIZE};
use crate::encoding::DataBlockEncoding;

/// Immutable per-file parameters shared read-only by every context of a file.
#[derive(Clone)]
pub struct FileContext {
    compressor: Arc<dyn Compressor>,
    checksum: ChecksumType,
    bytes_per_checksum: u32,
    block_size: u32,
    include_mvcc: bool,
    include_tags: bool,
    comparator: CellComparator,
    encoding: DataBlockEncoding,
}

impl FileContext {
    /// A context with default settings around `compressor`.
    pub fn new(compressor: Arc<dyn Compressor>) -> Self {
        Self {
            compressor,
            checksum: ChecksumType::Xxh3,
            bytes_per_checksum: DEFAULT_BYTES_PER_CHECKSUM,
            block_size: DEFAULT_BLOCK_SIZE,
            include_mvcc: true,
            include_tags: false,
            comparator: CellComparator::Bytewise,
            encoding: DataBlockEncoding::None,
        }
    }

    /// Build from a validated config. The compressor must implement
    /// `config.compression`; callers resolve it through the codecs crate.
    pub fn from_config(config: &EncodingConfig, compressor: Arc<dyn Compressor>) -> Self {
        Self::new(compressor)
            .with_checksum(config.checksum, config.bytes_per_checksum)
            .with_block_size(config.block_size)
            .with_include_mvcc(config.include_mvcc)
            .with_include_tags(config.include_tags)
            .with_encoding(config.data_block_encoding)
    }

    pub fn with_checksum(mut self, checksum: ChecksumType, bytes_per_checksum: u32) -> Self {
        self.checksum = checksum;
        self.bytes_per_checksum = bytes_per_checksum.max(1);
        self
    }

    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_include_mvcc(mut self, include_mvcc: bool) -> Self {
        self.include_mvcc = include_mvcc;
        self
    }

    pub fn with_include_tags(mut self, include_tags: bool) -> Self {
        self.include_tags = include_tags;
        self
    }

    pub fn with_encoding(mut self, encoding: DataBlockEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn compressor(&self) -> &dyn Compressor {
        self.compressor.as_ref()
    }

    pub fn checksum(&self) -> ChecksumType {
        self.checksum
    }

    pub fn bytes_per_checksum(&self) -> u32 {
        self.bytes_per_checksum
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn include_mvcc(&self) -> bool {
        self.include_mvcc
    }

    pub fn include_tags(&self) -> bool {
        self.include_tags
    }

    pub fn comparator(&self) -> CellComparator {
        self.comparator
    }

    /// Encoding configured for the file.
    pub fn encoding(&self) -> DataBlockEncoding {
        self.encoding
    }
}

impl fmt::Debug for FileContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileContext")
            .field("compression", &self.compressor.algorithm())
            .field("checksum", &self.checksum)
            .field("bytes_per_checksum", &self.bytes_per_checksum)
            .field("block_size", &self.block_size)
            .field("include_mvcc", &self.include_mvcc)
            .field("include_tags", &self.include_tags)
            .field("comparator", &self.comparator)
            .field("encoding", &self.encoding)
            .finish()
    }
}
