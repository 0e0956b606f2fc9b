use std::fmt;
use std::sync::Arc;

use tracing::{trace, warn};

use crate::cell::Cell;
use crate::config::EncodingConfig;
use crate::context::{DecodingContext, EncodingContext, EncodingState, StrategyScratch};
use crate::encoder::DataBlockEncoder;
use crate::encoding::DataBlockEncoding;
use crate::error::{Error, Result};
use crate::file_info::MetadataWriter;
use crate::format::BlockType;
use crate::meta::FileContext;
use crate::sink::BlockSink;

/// Strategy that performs no encoding: cells are written in their raw
/// serialized form and read back unchanged.
///
/// Default when no encoding is configured, baseline for other strategies'
/// round trips, and fallback when a strategy is disabled.
pub struct NoOpDataBlockEncoder {
    _private: (),
}

impl NoOpDataBlockEncoder {
    /// The only instance.
    pub const INSTANCE: NoOpDataBlockEncoder = NoOpDataBlockEncoder { _private: () };

    fn check_context(&self, encoding: DataBlockEncoding) -> Result<()> {
        if encoding != DataBlockEncoding::None {
            warn!(strategy = %self, context = %encoding, "rejected foreign encoding context");
            return Err(Error::IncompatibleContext {
                strategy: DataBlockEncoding::None,
                context: encoding,
            });
        }
        Ok(())
    }
}

/// Writes cells verbatim into the open block.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NoneEncoder {
    include_tags: bool,
    include_mvcc: bool,
}

impl NoneEncoder {
    fn new(file_context: &FileContext) -> Self {
        Self {
            include_tags: file_context.include_tags(),
            include_mvcc: file_context.include_mvcc(),
        }
    }

    /// Returns the number of bytes written.
    fn write(&self, cell: &Cell, out: &mut dyn BlockSink) -> Result<usize> {
        Ok(cell.write_to(out, self.include_tags, self.include_mvcc)?)
    }
}

/// The open block's `NoneEncoder`, provided the state was built by this strategy.
fn none_encoder(state: &EncodingState) -> Result<NoneEncoder> {
    if state.owner() != DataBlockEncoding::None {
        return Err(Error::IncompatibleState {
            strategy: DataBlockEncoding::None,
            state: state.owner(),
        });
    }
    let StrategyScratch::None(encoder) = &state.scratch;
    Ok(*encoder)
}

impl DataBlockEncoder for NoOpDataBlockEncoder {
    fn encode(&self, cell: &Cell, ctx: &mut EncodingContext, out: &mut dyn BlockSink) -> Result<()> {
        let encoder = none_encoder(ctx.encoding_state_mut("encode")?)?;
        match encoder.write(cell, out) {
            Ok(size) => {
                ctx.encoding_state_mut("encode")?.post_cell_encode(size, size);
                Ok(())
            }
            Err(e) => {
                // Part of the cell may already be in `out`.
                ctx.abandon_block();
                Err(e)
            }
        }
    }

    fn uses_encoded_scanner(&self) -> bool {
        false
    }

    fn save_metadata(&self, _writer: &mut dyn MetadataWriter) -> Result<()> {
        // Nothing beyond the cells themselves to persist.
        Ok(())
    }

    fn data_block_encoding(&self) -> DataBlockEncoding {
        DataBlockEncoding::None
    }

    fn effective_encoding_in_cache(&self, _is_compaction: bool) -> DataBlockEncoding {
        DataBlockEncoding::None
    }

    fn new_encoding_context(
        &self,
        _config: &EncodingConfig,
        dummy_header: &[u8],
        file_context: Arc<FileContext>,
    ) -> EncodingContext {
        EncodingContext::new(DataBlockEncoding::None, dummy_header, file_context)
    }

    fn new_decoding_context(&self, _config: &EncodingConfig, file_context: Arc<FileContext>) -> DecodingContext {
        DecodingContext::new(DataBlockEncoding::None, file_context)
    }

    fn start_block_encoding(&self, ctx: &mut EncodingContext, out: &mut dyn BlockSink) -> Result<()> {
        self.check_context(ctx.encoding())?;
        ctx.prepare_encoding(out)?;

        let encoder = NoneEncoder::new(ctx.file_context());
        ctx.set_encoding_state(EncodingState::new(
            DataBlockEncoding::None,
            StrategyScratch::None(encoder),
        ))?;
        trace!(position = out.position(), "none block encoding started");
        Ok(())
    }

    fn end_block_encoding(
        &self,
        ctx: &mut EncodingContext,
        out: &mut dyn BlockSink,
        _block_type: BlockType,
    ) -> Result<()> {
        self.check_context(ctx.encoding())?;
        ctx.post_encoding(out.bytes(), BlockType::Data)?;
        trace!(position = out.position(), "none block encoding ended");
        Ok(())
    }

    fn decode_block(&self, ctx: &DecodingContext, body: &[u8]) -> Result<Vec<Cell>> {
        self.check_context(ctx.encoding())?;
        let file_context = ctx.file_context();
        let (include_tags, include_mvcc) = (file_context.include_tags(), file_context.include_mvcc());

        let mut buf = body;
        let mut cells = Vec::new();
        while !buf.is_empty() {
            cells.push(Cell::read_from(&mut buf, include_tags, include_mvcc)?);
        }
        Ok(cells)
    }
}

impl fmt::Display for NoOpDataBlockEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NoOpDataBlockEncoder")
    }
}

impl fmt::Debug for NoOpDataBlockEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
