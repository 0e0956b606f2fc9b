use std::cmp::Ordering;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::block::{size_u32, BlockWriter};
use crate::cell::Cell;
use crate::config::EncodingConfig;
use crate::encoder::DataBlockEncoder;
use crate::error::{Error, Result};
use crate::file_info::{FileInfo, MetadataWriter, AVG_KEY_LEN, AVG_VALUE_LEN, LAST_KEY, MAX_SEQ_ID};
use crate::format::{
    BlockIndexEntry, Trailer, FLAG_INCLUDES_MVCC, FLAG_INCLUDES_TAGS, FORMAT_VERSION, NO_PREV_BLOCK,
};
use crate::meta::FileContext;

/// Streaming writer for cellblock data files.
///
/// # Write contract
/// Call [`append`](Self::append) with cells in comparator order. The writer
/// encodes them into the open block and rolls to a new block once the block's
/// unencoded size reaches the configured block size. Call
/// [`finish`](Self::finish) to flush the last block, let the strategy save its
/// metadata, and write file info, block index and trailer.
///
/// Once an append or flush fails the writer is poisoned: every later
/// `append` and `finish` returns [`Error::Poisoned`]. Out-of-order cells are
/// rejected without poisoning.
///
/// # Format layout written
/// ```text
/// [BLOCK 0] [BLOCK 1] ... [BLOCK N-1]
/// [FILE INFO]
/// [BLOCK INDEX: one entry per block]
/// [TRAILER: 56 bytes]
/// ```
pub struct Writer {
    file: File,
    encoder: &'static dyn DataBlockEncoder,
    file_context: Arc<FileContext>,
    blocks: BlockWriter,
    file_info: FileInfo,
    index: Vec<BlockIndexEntry>,
    /// Current write position in the file (mirrors the file cursor).
    current_offset: u64,
    prev_block_offset: u64,
    last_cell: Option<Cell>,
    entry_count: u64,
    total_key_len: u64,
    total_value_len: u64,
    max_seq_id: u64,
    failed: bool,
}

/// What [`Writer::finish`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSummary {
    pub block_count: u64,
    pub entry_count: u64,
    pub file_size: u64,
}

impl Writer {
    /// Create a new data file at `path`, overwriting any existing file.
    ///
    /// `encoder` must be the strategy `file_context` is configured for.
    pub fn create(
        path: impl AsRef<Path>,
        encoder: &'static dyn DataBlockEncoder,
        config: &EncodingConfig,
        file_context: Arc<FileContext>,
    ) -> Result<Self> {
        if encoder.data_block_encoding() != file_context.encoding() {
            return Err(Error::Config(format!(
                "file is configured for {} but the encoder writes {}",
                file_context.encoding(),
                encoder.data_block_encoding()
            )));
        }
        let file = File::create(path)?;
        Ok(Self {
            file,
            encoder,
            blocks: BlockWriter::new(encoder, config, file_context.clone()),
            file_context,
            file_info: FileInfo::new(),
            index: Vec::new(),
            current_offset: 0,
            prev_block_offset: NO_PREV_BLOCK,
            last_cell: None,
            entry_count: 0,
            total_key_len: 0,
            total_value_len: 0,
            max_seq_id: 0,
            failed: false,
        })
    }

    /// Add user metadata to the file info section.
    pub fn append_file_info(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.file_info.append_file_info(key, value)
    }

    /// Encode `cell` into the open block, starting one if needed.
    pub fn append(&mut self, cell: &Cell) -> Result<()> {
        if self.failed {
            return Err(Error::Poisoned);
        }
        if let Some(last) = &self.last_cell {
            if self.file_context.comparator().compare(last, cell) == Ordering::Greater {
                return Err(Error::OutOfOrder {
                    previous: last.key().to_vec(),
                    current: cell.key().to_vec(),
                });
            }
        }

        let result = self.encode(cell);
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    fn encode(&mut self, cell: &Cell) -> Result<()> {
        if !self.blocks.is_open() {
            self.blocks.start_block()?;
        }
        self.blocks.write(cell)?;

        self.entry_count += 1;
        self.total_key_len += cell.key().len() as u64;
        self.total_value_len += cell.value().len() as u64;
        self.max_seq_id = self.max_seq_id.max(cell.sequence_id());
        self.last_cell = Some(cell.clone());

        if self.blocks.unencoded_size_written() >= u64::from(self.file_context.block_size()) {
            self.flush_block()?;
        }
        Ok(())
    }

    /// Finish the open block and append it to the file.
    fn flush_block(&mut self) -> Result<()> {
        let block = self.blocks.finish_block(self.prev_block_offset)?;
        let on_disk_size = size_u32(block.bytes.len())?;
        self.file.write_all(&block.bytes)?;

        self.index.push(BlockIndexEntry {
            offset: self.current_offset,
            on_disk_size,
            first_key: block.first_key,
        });
        self.prev_block_offset = self.current_offset;
        self.current_offset += block.bytes.len() as u64;
        Ok(())
    }

    /// Flush the last block, write file info, block index and trailer.
    pub fn finish(mut self) -> Result<FileSummary> {
        if self.failed {
            return Err(Error::Poisoned);
        }
        if self.blocks.is_open() {
            self.flush_block()?;
        }

        // ── File info ──────────────────────────────────────────────────────
        self.encoder.save_metadata(&mut self.file_info)?;
        if let Some(last) = &self.last_cell {
            self.file_info.insert_reserved(LAST_KEY, last.key());
        }
        let entries = self.entry_count.max(1);
        self.file_info
            .insert_reserved(AVG_KEY_LEN, (self.total_key_len / entries).to_le_bytes());
        self.file_info
            .insert_reserved(AVG_VALUE_LEN, (self.total_value_len / entries).to_le_bytes());
        self.file_info
            .insert_reserved(MAX_SEQ_ID, self.max_seq_id.to_le_bytes());

        let file_info_offset = self.current_offset;
        let info_bytes = self.file_info.to_bytes();
        self.file.write_all(&info_bytes)?;
        self.current_offset += info_bytes.len() as u64;

        // ── Block index ────────────────────────────────────────────────────
        let index_offset = self.current_offset;
        let mut index_bytes = Vec::new();
        for entry in &self.index {
            entry.write_to(&mut index_bytes);
        }
        self.file.write_all(&index_bytes)?;
        self.current_offset += index_bytes.len() as u64;

        // ── Trailer ────────────────────────────────────────────────────────
        let mut flags = 0;
        if self.file_context.include_mvcc() {
            flags |= FLAG_INCLUDES_MVCC;
        }
        if self.file_context.include_tags() {
            flags |= FLAG_INCLUDES_TAGS;
        }
        let trailer = Trailer {
            version: FORMAT_VERSION,
            encoding: self.encoder.data_block_encoding(),
            compression: self.file_context.compressor().algorithm(),
            checksum_type: self.file_context.checksum(),
            flags,
            file_info_offset,
            index_offset,
            block_count: self.index.len() as u64,
            entry_count: self.entry_count,
            bytes_per_checksum: self.file_context.bytes_per_checksum(),
            block_size: self.file_context.block_size(),
        };
        let trailer_bytes = trailer.to_bytes();
        self.file.write_all(&trailer_bytes)?;
        self.current_offset += trailer_bytes.len() as u64;
        self.file.flush()?;

        info!(
            encoding = %trailer.encoding,
            compression = %trailer.compression,
            blocks = trailer.block_count,
            entries = trailer.entry_count,
            bytes = self.current_offset,
            "data file sealed"
        );

        Ok(FileSummary {
            block_count: trailer.block_count,
            entry_count: trailer.entry_count,
            file_size: self.current_offset,
        })
    }
}
