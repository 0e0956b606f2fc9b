//! Data block encoding for cellblock data files.
//!
//! A [`DataBlockEncoder`] strategy turns an ordered run of [`Cell`]s into the
//! bytes of one data block and back. Every strategy follows the same
//! lifecycle over an [`EncodingContext`]: `start_block_encoding`, `encode`
//! per cell, `end_block_encoding`. [`NoOpDataBlockEncoder`] is the reference
//! strategy; [`BlockWriter`], [`Writer`] and [`Reader`] drive it over blocks
//! and files.

pub mod block;
pub mod cell;
pub mod checksum;
pub mod compression;
pub mod config;
pub mod context;
pub mod encoder;
pub mod encoding;
pub mod error;
pub mod file_info;
pub mod format;
pub mod meta;
pub mod reader;
pub mod sink;
pub mod writer;

pub use block::{Block, BlockWriter, FinishedBlock};
pub use cell::{Cell, CellComparator};
pub use checksum::ChecksumType;
pub use compression::{CompressionAlgorithm, Compressor};
pub use config::EncodingConfig;
pub use context::{DecodingContext, EncodingContext, EncodingState};
pub use encoder::{encoder_for, DataBlockEncoder, NoOpDataBlockEncoder};
pub use encoding::DataBlockEncoding;
pub use error::{BlockState, Error, Result};
pub use file_info::{FileInfo, MetadataWriter};
pub use format::{BlockHeader, BlockIndexEntry, BlockType, Trailer, HEADER_SIZE, TRAILER_SIZE};
pub use meta::FileContext;
pub use reader::{peek_trailer, DecodedBlock, Reader};
pub use sink::BlockSink;
pub use writer::{FileSummary, Writer};
