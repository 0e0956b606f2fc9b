use std::sync::Arc;

use tracing::debug;

use crate::cell::Cell;
use crate::config::EncodingConfig;
use crate::context::{DecodingContext, EncodingContext};
use crate::encoder::DataBlockEncoder;
use crate::error::{BlockState, Error, Result};
use crate::format::{BlockHeader, BlockType, HEADER_SIZE};
use crate::meta::FileContext;

/// Drives one strategy through a sequence of blocks.
///
/// # Block layout written
/// ```text
/// [HEADER: 33 bytes]            ← dummy at start, back-filled in finish_block()
/// [BODY]                        ← cells as encoded by the strategy, then compressed
/// [CHECKSUMS: 8 bytes × chunks] ← one per bytes_per_checksum of header + body
/// ```
pub struct BlockWriter {
    encoder: &'static dyn DataBlockEncoder,
    ctx: EncodingContext,
    /// Uncompressed image of the open block, header placeholder first.
    buffer: Vec<u8>,
    first_key: Option<Vec<u8>>,
}

/// A finished block, ready to be appended to a file.
#[derive(Debug, Clone)]
pub struct FinishedBlock {
    pub header: BlockHeader,
    /// Header + compressed body + checksums.
    pub bytes: Vec<u8>,
    pub first_key: Vec<u8>,
    pub cells: u64,
    pub unencoded_size: u64,
}

impl BlockWriter {
    pub fn new(encoder: &'static dyn DataBlockEncoder, config: &EncodingConfig, file_context: Arc<FileContext>) -> Self {
        let dummy = BlockHeader::dummy(
            BlockType::Data,
            file_context.checksum(),
            file_context.bytes_per_checksum(),
        );
        let ctx = encoder.new_encoding_context(config, &dummy, file_context);
        Self {
            encoder,
            ctx,
            buffer: Vec::new(),
            first_key: None,
        }
    }

    pub fn encoder(&self) -> &'static dyn DataBlockEncoder {
        self.encoder
    }

    pub fn is_open(&self) -> bool {
        self.ctx.is_open()
    }

    /// Open a new block: reserve the header and start the strategy.
    pub fn start_block(&mut self) -> Result<()> {
        if self.ctx.is_open() {
            return Err(Error::Protocol {
                op: "start_block",
                state: BlockState::Open,
            });
        }
        self.buffer.clear();
        self.buffer.extend_from_slice(self.ctx.dummy_header());
        self.first_key = None;
        self.encoder.start_block_encoding(&mut self.ctx, &mut self.buffer)
    }

    /// Encode one cell into the open block. On failure the block is
    /// abandoned and the writer is idle again.
    pub fn write(&mut self, cell: &Cell) -> Result<()> {
        if let Err(e) = self.encoder.encode(cell, &mut self.ctx, &mut self.buffer) {
            self.abandon_block();
            return Err(e);
        }
        if self.first_key.is_none() {
            self.first_key = Some(cell.key().to_vec());
        }
        Ok(())
    }

    /// Raw size of the cells in the open block; zero when idle.
    pub fn unencoded_size_written(&self) -> u64 {
        self.ctx
            .encoding_state()
            .map_or(0, |s| s.unencoded_data_size_written())
    }

    pub fn encoded_size_written(&self) -> u64 {
        self.ctx
            .encoding_state()
            .map_or(0, |s| s.encoded_data_size_written())
    }

    pub fn cells_written(&self) -> u64 {
        self.ctx.encoding_state().map_or(0, |s| s.cells_written())
    }

    /// End the open block, back-fill its header and append checksums.
    ///
    /// A failure leaves nothing behind: the block is dropped and the writer
    /// is idle.
    pub fn finish_block(&mut self, prev_block_offset: u64) -> Result<FinishedBlock> {
        let result = self.seal_block(prev_block_offset);
        if result.is_err() {
            self.abandon_block();
        }
        result
    }

    fn seal_block(&mut self, prev_block_offset: u64) -> Result<FinishedBlock> {
        let cells = self.cells_written();
        let unencoded_size = self.unencoded_size_written();

        self.encoder
            .end_block_encoding(&mut self.ctx, &mut self.buffer, BlockType::Data)?;
        let mut image = self.ctx.take_on_disk_block()?;

        let file_context = self.ctx.file_context();
        let checksum = file_context.checksum();
        let bytes_per_checksum = file_context.bytes_per_checksum();
        let checksum_bytes = checksum.checksum_bytes(image.len(), bytes_per_checksum);

        let header = BlockHeader {
            block_type: self.ctx.block_type(),
            on_disk_size_without_header: size_u32(image.len() - HEADER_SIZE + checksum_bytes)?,
            uncompressed_size_without_header: size_u32(self.buffer.len() - HEADER_SIZE)?,
            prev_block_offset,
            checksum_type: checksum,
            bytes_per_checksum,
            on_disk_data_size_with_header: size_u32(image.len())?,
        };
        image[..HEADER_SIZE].copy_from_slice(&header.to_bytes());

        let mut sums = Vec::with_capacity(checksum_bytes);
        checksum.generate(&image, bytes_per_checksum, &mut sums);
        image.extend_from_slice(&sums);

        debug!(
            block_type = ?header.block_type,
            cells,
            on_disk = image.len(),
            uncompressed = header.uncompressed_size_without_header,
            "block finished"
        );

        Ok(FinishedBlock {
            header,
            bytes: image,
            first_key: self.first_key.take().unwrap_or_default(),
            cells,
            unencoded_size,
        })
    }

    fn abandon_block(&mut self) {
        self.ctx.abandon_block();
        self.buffer.clear();
        self.first_key = None;
    }
}

pub(crate) fn size_u32(n: usize) -> Result<u32> {
    u32::try_from(n).map_err(|_| Error::corrupt(format!("block size {n} exceeds u32::MAX")))
}

/// A block read back from disk, checksums verified.
#[derive(Debug, Clone)]
pub struct Block {
    header: BlockHeader,
    bytes: Vec<u8>,
}

impl Block {
    /// Validate header, sizes and checksums of one on-disk block.
    pub fn parse(bytes: Vec<u8>) -> Result<Self> {
        let header = BlockHeader::from_bytes(&bytes)?;
        if bytes.len() != header.on_disk_size_with_header() {
            return Err(Error::corrupt(format!(
                "block is {} bytes but its header says {}",
                bytes.len(),
                header.on_disk_size_with_header()
            )));
        }
        let data_len = header.on_disk_data_size_with_header as usize;
        if data_len < HEADER_SIZE || data_len > bytes.len() {
            return Err(Error::corrupt(format!("invalid on-disk data size {data_len}")));
        }
        let (data, checksums) = bytes.split_at(data_len);
        header
            .checksum_type
            .verify(data, header.bytes_per_checksum.max(1), checksums)?;
        Ok(Self { header, bytes })
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    /// Compressed body, header and checksums excluded.
    pub fn on_disk_body(&self) -> &[u8] {
        &self.bytes[HEADER_SIZE..self.header.on_disk_data_size_with_header as usize]
    }

    /// Decompress through `ctx` and decode cells through `encoder`.
    pub fn decode(&self, encoder: &dyn DataBlockEncoder, ctx: &DecodingContext) -> Result<Vec<Cell>> {
        let raw = ctx.prepare_decoding(
            self.header.uncompressed_size_without_header as usize,
            self.on_disk_body(),
        )?;
        let body = match self.header.block_type {
            BlockType::Data => &raw[..],
            BlockType::EncodedData => {
                if raw.len() < 2 || raw[..2] != ctx.encoding().id_bytes() {
                    return Err(Error::corrupt(format!(
                        "encoded block does not start with the id of {}",
                        ctx.encoding()
                    )));
                }
                &raw[2..]
            }
        };
        encoder.decode_block(ctx, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_past_u32_are_rejected() {
        assert_eq!(size_u32(u32::MAX as usize).unwrap(), u32::MAX);
        #[cfg(target_pointer_width = "64")]
        assert!(matches!(size_u32(u32::MAX as usize + 1), Err(Error::Corrupt(_))));
    }
}
