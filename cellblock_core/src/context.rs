use std::sync::Arc;

use tracing::{debug, warn};

use crate::encoder::noop::NoneEncoder;
use crate::encoding::DataBlockEncoding;
use crate::error::{BlockState, Error, Result};
use crate::format::BlockType;
use crate::meta::FileContext;
use crate::sink::BlockSink;

// ── Encoding state ─────────────────────────────────────────────────────────

/// Per-block scratch data, owned by one [`EncodingContext`] while a block is open.
///
/// Built by `start_block_encoding`, advanced only by the owning strategy's
/// `encode`, dropped by `end_block_encoding`. Never reused across blocks.
#[derive(Debug)]
pub struct EncodingState {
    owner: DataBlockEncoding,
    unencoded_data_size_written: u64,
    encoded_data_size_written: u64,
    cells_written: u64,
    pub(crate) scratch: StrategyScratch,
}

/// Strategy-specific part of an [`EncodingState`].
#[derive(Debug)]
pub(crate) enum StrategyScratch {
    None(NoneEncoder),
}

impl EncodingState {
    pub(crate) fn new(owner: DataBlockEncoding, scratch: StrategyScratch) -> Self {
        Self {
            owner,
            unencoded_data_size_written: 0,
            encoded_data_size_written: 0,
            cells_written: 0,
            scratch,
        }
    }

    /// Strategy that built this state.
    pub fn owner(&self) -> DataBlockEncoding {
        self.owner
    }

    /// Record one encoded cell: its raw serialized size and the bytes it took in the block.
    pub(crate) fn post_cell_encode(&mut self, unencoded: usize, encoded: usize) {
        self.unencoded_data_size_written += unencoded as u64;
        self.encoded_data_size_written += encoded as u64;
        self.cells_written += 1;
    }

    /// Raw size of the cells written so far; drives block-full decisions.
    pub fn unencoded_data_size_written(&self) -> u64 {
        self.unencoded_data_size_written
    }

    pub fn encoded_data_size_written(&self) -> u64 {
        self.encoded_data_size_written
    }

    pub fn cells_written(&self) -> u64 {
        self.cells_written
    }
}

// ── Encoding context ───────────────────────────────────────────────────────

/// Session object driving blocks through one strategy.
///
/// Long-lived: one block writer reuses it for every block it produces, one
/// block at a time. It records the strategy that manufactured it so that a
/// strategy can refuse contexts it did not create.
///
/// ```text
/// Idle ──start_block_encoding──▶ Open ──encode*──▶ Open ──end_block_encoding──▶ Idle
/// ```
#[derive(Debug)]
pub struct EncodingContext {
    encoding: DataBlockEncoding,
    file_context: Arc<FileContext>,
    /// Owned copy; never shared with another context.
    dummy_header: Vec<u8>,
    block_type: BlockType,
    state: Option<EncodingState>,
    /// Header placeholder + compressed body of the last finished block.
    on_disk_block: Option<Vec<u8>>,
    blocks_finished: u64,
}

impl EncodingContext {
    /// Only strategy factories build contexts directly, so a `NONE` context
    /// can only come from the no-op strategy.
    pub(crate) fn new(encoding: DataBlockEncoding, dummy_header: &[u8], file_context: Arc<FileContext>) -> Self {
        Self {
            encoding,
            file_context,
            dummy_header: dummy_header.to_vec(),
            block_type: BlockType::Data,
            state: None,
            on_disk_block: None,
            blocks_finished: 0,
        }
    }

    /// Context for a delta-family strategy implemented outside this crate.
    /// `NONE` is refused: that context comes from the no-op strategy's factory.
    pub fn for_delta_encoding(
        encoding: DataBlockEncoding,
        dummy_header: &[u8],
        file_context: Arc<FileContext>,
    ) -> Result<Self> {
        check_delta(encoding)?;
        Ok(Self::new(encoding, dummy_header, file_context))
    }

    /// Strategy that manufactured this context.
    pub fn encoding(&self) -> DataBlockEncoding {
        self.encoding
    }

    pub fn file_context(&self) -> &FileContext {
        &self.file_context
    }

    pub fn dummy_header(&self) -> &[u8] {
        &self.dummy_header
    }

    /// Block type of the last finished block.
    pub fn block_type(&self) -> BlockType {
        self.block_type
    }

    pub fn block_state(&self) -> BlockState {
        if self.state.is_some() {
            BlockState::Open
        } else {
            BlockState::Idle
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    pub fn blocks_finished(&self) -> u64 {
        self.blocks_finished
    }

    pub fn encoding_state(&self) -> Option<&EncodingState> {
        self.state.as_ref()
    }

    /// The open block's state, or a protocol violation naming `op` when idle.
    pub(crate) fn encoding_state_mut(&mut self, op: &'static str) -> Result<&mut EncodingState> {
        match self.state.as_mut() {
            Some(state) => Ok(state),
            None => Err(protocol(op, BlockState::Idle)),
        }
    }

    pub(crate) fn set_encoding_state(&mut self, state: EncodingState) -> Result<()> {
        if self.state.is_some() {
            return Err(protocol("start_block_encoding", BlockState::Open));
        }
        self.state = Some(state);
        Ok(())
    }

    /// Ready `out` for a new block. Non-`NONE` contexts write the encoding id
    /// right after the header placeholder.
    pub fn prepare_encoding(&mut self, out: &mut dyn BlockSink) -> Result<()> {
        if self.state.is_some() {
            return Err(protocol("start_block_encoding", BlockState::Open));
        }
        self.on_disk_block = None;
        if self.encoding != DataBlockEncoding::None {
            out.write_all(&self.encoding.id_bytes())?;
        }
        Ok(())
    }

    /// Close the open block: settle its block type, compress the body of
    /// `uncompressed_bytes_with_header` and keep the result for
    /// [`take_on_disk_block`](Self::take_on_disk_block). The state is dropped
    /// even when compression fails, so a failed block can never be taken.
    pub fn post_encoding(&mut self, uncompressed_bytes_with_header: &[u8], block_type: BlockType) -> Result<()> {
        let state = self
            .state
            .take()
            .ok_or_else(|| protocol("end_block_encoding", BlockState::Idle))?;

        self.block_type = if self.encoding != DataBlockEncoding::None && block_type == BlockType::Data {
            BlockType::EncodedData
        } else {
            block_type
        };

        let header_len = self.dummy_header.len();
        if uncompressed_bytes_with_header.len() < header_len {
            return Err(Error::corrupt(format!(
                "block image of {} bytes is shorter than the {header_len}-byte header",
                uncompressed_bytes_with_header.len()
            )));
        }
        let (header, body) = uncompressed_bytes_with_header.split_at(header_len);

        let compressor = self.file_context.compressor();
        let compressed = compressor.compress(body).map_err(|source| Error::Compression {
            algorithm: compressor.algorithm(),
            source,
        })?;

        let mut image = Vec::with_capacity(header_len + compressed.len());
        image.extend_from_slice(header);
        image.extend_from_slice(&compressed);

        debug!(
            encoding = %self.encoding,
            cells = state.cells_written(),
            unencoded = state.unencoded_data_size_written(),
            body = body.len(),
            compressed = compressed.len(),
            "block encoding finished"
        );

        self.on_disk_block = Some(image);
        self.blocks_finished += 1;
        Ok(())
    }

    /// Discard the open block after a failed write: its state and any
    /// unclaimed on-disk image are dropped, so it can never be finished.
    /// Returns whether a block was open.
    pub fn abandon_block(&mut self) -> bool {
        self.on_disk_block = None;
        match self.state.take() {
            Some(state) => {
                warn!(
                    encoding = %self.encoding,
                    cells = state.cells_written(),
                    "open block abandoned"
                );
                true
            }
            None => false,
        }
    }

    /// Hand over the on-disk image of the last finished block, exactly once.
    pub fn take_on_disk_block(&mut self) -> Result<Vec<u8>> {
        self.on_disk_block
            .take()
            .ok_or_else(|| protocol("take_on_disk_block", self.block_state()))
    }
}

fn check_delta(encoding: DataBlockEncoding) -> Result<()> {
    if encoding == DataBlockEncoding::None {
        return Err(Error::Config(
            "NONE contexts are only built by the no-op strategy".into(),
        ));
    }
    Ok(())
}

fn protocol(op: &'static str, state: BlockState) -> Error {
    warn!(op, %state, "rejected out-of-order block encoding call");
    Error::Protocol { op, state }
}

// ── Decoding context ───────────────────────────────────────────────────────

/// Read-side counterpart of [`EncodingContext`]: reverses the post-encoding
/// transform of one block. Holds no per-block state.
#[derive(Debug, Clone)]
pub struct DecodingContext {
    encoding: DataBlockEncoding,
    file_context: Arc<FileContext>,
}

impl DecodingContext {
    pub(crate) fn new(encoding: DataBlockEncoding, file_context: Arc<FileContext>) -> Self {
        Self {
            encoding,
            file_context,
        }
    }

    /// Read-side counterpart of [`EncodingContext::for_delta_encoding`].
    pub fn for_delta_encoding(encoding: DataBlockEncoding, file_context: Arc<FileContext>) -> Result<Self> {
        check_delta(encoding)?;
        Ok(Self::new(encoding, file_context))
    }

    pub fn encoding(&self) -> DataBlockEncoding {
        self.encoding
    }

    pub fn file_context(&self) -> &FileContext {
        &self.file_context
    }

    /// Decompress a block body (header and checksums already stripped).
    pub fn prepare_decoding(&self, uncompressed_size_without_header: usize, on_disk_body: &[u8]) -> Result<Vec<u8>> {
        let compressor = self.file_context.compressor();
        let raw = compressor
            .decompress(on_disk_body, uncompressed_size_without_header)
            .map_err(|source| Error::Compression {
                algorithm: compressor.algorithm(),
                source,
            })?;
        if raw.len() != uncompressed_size_without_header {
            return Err(Error::corrupt(format!(
                "block decompressed to {} bytes but header says {uncompressed_size_without_header}",
                raw.len()
            )));
        }
        Ok(raw)
    }
}
