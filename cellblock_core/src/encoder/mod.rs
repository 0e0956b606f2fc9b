pub mod noop;

use std::sync::Arc;

use crate::cell::Cell;
use crate::config::EncodingConfig;
use crate::context::{DecodingContext, EncodingContext};
use crate::encoding::DataBlockEncoding;
use crate::error::{Error, Result};
use crate::file_info::MetadataWriter;
use crate::format::BlockType;
use crate::meta::FileContext;
use crate::sink::BlockSink;

pub use noop::NoOpDataBlockEncoder;

/// Contract shared by every data block encoding strategy.
///
/// Strategies are stateless and shared read-only; all per-block mutable data
/// lives in the [`EncodingState`](crate::EncodingState) installed into an
/// [`EncodingContext`] by [`start_block_encoding`](Self::start_block_encoding).
///
/// A block writer drives one block as:
/// 1. `start_block_encoding(ctx, out)`, exactly once;
/// 2. `encode(cell, ctx, out)` for each cell, in order;
/// 3. `end_block_encoding(ctx, out, block_type)`, exactly once.
///
/// Any other order fails with a protocol violation.
pub trait DataBlockEncoder: Send + Sync + std::fmt::Debug {
    /// Append one cell to `out`, advancing the open block's byte counters.
    fn encode(&self, cell: &Cell, ctx: &mut EncodingContext, out: &mut dyn BlockSink) -> Result<()>;

    /// Whether in-cache iteration needs a strategy-specific scanner.
    fn uses_encoded_scanner(&self) -> bool;

    /// Persist strategy-specific metadata into the file being written.
    fn save_metadata(&self, writer: &mut dyn MetadataWriter) -> Result<()>;

    /// Identity tagged onto blocks and files written by this strategy.
    fn data_block_encoding(&self) -> DataBlockEncoding;

    /// Encoding recorded for a block promoted into the block cache.
    fn effective_encoding_in_cache(&self, is_compaction: bool) -> DataBlockEncoding;

    fn new_encoding_context(
        &self,
        config: &EncodingConfig,
        dummy_header: &[u8],
        file_context: Arc<FileContext>,
    ) -> EncodingContext;

    fn new_decoding_context(&self, config: &EncodingConfig, file_context: Arc<FileContext>) -> DecodingContext;

    /// Open a block on `ctx`. Fails unless this strategy manufactured `ctx`
    /// and `ctx` is idle.
    fn start_block_encoding(&self, ctx: &mut EncodingContext, out: &mut dyn BlockSink) -> Result<()>;

    /// Close the open block. The complete uncompressed block image is read
    /// from `out`; the context's post-encoding transform runs over it and the
    /// block's state is dropped.
    fn end_block_encoding(&self, ctx: &mut EncodingContext, out: &mut dyn BlockSink, block_type: BlockType)
        -> Result<()>;

    /// Decode a whole uncompressed block body back into cells.
    fn decode_block(&self, ctx: &DecodingContext, body: &[u8]) -> Result<Vec<Cell>>;
}

static NO_OP: NoOpDataBlockEncoder = NoOpDataBlockEncoder::INSTANCE;

/// Resolve the strategy for a persisted identity.
///
/// Only `NONE` has an encoder in this crate; the delta family identities are
/// recognized but fail with [`Error::UnsupportedEncoding`].
pub fn encoder_for(encoding: DataBlockEncoding) -> Result<&'static dyn DataBlockEncoder> {
    match encoding {
        DataBlockEncoding::None => Ok(&NO_OP),
        other => Err(Error::UnsupportedEncoding(other)),
    }
}
