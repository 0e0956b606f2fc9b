use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::block::Block;
use crate::cell::Cell;
use crate::compression::Compressor;
use crate::config::EncodingConfig;
use crate::context::DecodingContext;
use crate::encoder::{encoder_for, DataBlockEncoder};
use crate::encoding::DataBlockEncoding;
use crate::error::{Error, Result};
use crate::file_info::FileInfo;
use crate::format::{
    BlockHeader, BlockIndexEntry, Trailer, FLAG_INCLUDES_MVCC, FLAG_INCLUDES_TAGS, TRAILER_SIZE,
};
use crate::meta::FileContext;

/// Random-access reader for cellblock data files.
///
/// # Open sequence
/// 1. Read the 56-byte trailer at the end of the file (magic, version,
///    encoding, compression, section offsets).
/// 2. Resolve the strategy from the persisted encoding identity.
/// 3. Load file info and the full block index into RAM.
///
/// [`read_block`](Self::read_block) then seeks straight to one block and
/// decodes only that block.
pub struct Reader {
    file: File,
    trailer: Trailer,
    file_info: FileInfo,
    entries: Vec<BlockIndexEntry>,
    encoder: &'static dyn DataBlockEncoder,
    decoding: DecodingContext,
}

/// Cells of one block plus what a block cache would record for it.
#[derive(Debug, Clone)]
pub struct DecodedBlock {
    pub header: BlockHeader,
    pub cells: Vec<Cell>,
    /// Encoding the block would carry in the block cache.
    pub encoding_in_cache: DataBlockEncoding,
}

impl Reader {
    /// Open a data file.
    ///
    /// `compressor` must match the compression recorded in the trailer. Use
    /// [`peek_trailer`] and `cellblock_codecs::compressor_for` to obtain the
    /// right one when it is not known up front.
    pub fn open(path: impl AsRef<Path>, compressor: Arc<dyn Compressor>) -> Result<Self> {
        let mut file = File::open(path)?;
        let trailer = read_trailer(&mut file)?;
        let file_len = file.seek(SeekFrom::End(0))?;

        if trailer.compression != compressor.algorithm() {
            return Err(Error::CompressionMismatch {
                file: trailer.compression,
                supplied: compressor.algorithm(),
            });
        }
        let encoder = encoder_for(trailer.encoding)?;

        let index_end = file_len - TRAILER_SIZE as u64;
        if trailer.file_info_offset > trailer.index_offset || trailer.index_offset > index_end {
            return Err(Error::corrupt(format!(
                "trailer section offsets {} / {} lie outside the file",
                trailer.file_info_offset, trailer.index_offset
            )));
        }

        // ── File info ──────────────────────────────────────────────────────
        let info_bytes = read_span(&mut file, trailer.file_info_offset, trailer.index_offset)?;
        let file_info = FileInfo::from_bytes(&info_bytes)?;

        // ── Block index ────────────────────────────────────────────────────
        let index_bytes = read_span(&mut file, trailer.index_offset, index_end)?;
        let mut buf = index_bytes.as_slice();
        let mut entries = Vec::with_capacity(trailer.block_count.min(1 << 20) as usize);
        for _ in 0..trailer.block_count {
            entries.push(BlockIndexEntry::read_from(&mut buf)?);
        }
        if !buf.is_empty() {
            return Err(Error::corrupt(format!("{} trailing bytes after block index", buf.len())));
        }

        let config = config_from_trailer(&trailer);
        let file_context = Arc::new(FileContext::from_config(&config, compressor));
        let decoding = encoder.new_decoding_context(&config, file_context);

        debug!(
            encoding = %trailer.encoding,
            compression = %trailer.compression,
            blocks = trailer.block_count,
            "data file opened"
        );

        Ok(Self {
            file,
            trailer,
            file_info,
            entries,
            encoder,
            decoding,
        })
    }

    pub fn trailer(&self) -> &Trailer {
        &self.trailer
    }

    pub fn file_info(&self) -> &FileInfo {
        &self.file_info
    }

    /// Access the block index (for inspection).
    pub fn entries(&self) -> &[BlockIndexEntry] {
        &self.entries
    }

    #[inline]
    pub fn block_count(&self) -> u64 {
        self.trailer.block_count
    }

    #[inline]
    pub fn entry_count(&self) -> u64 {
        self.trailer.entry_count
    }

    pub fn encoding(&self) -> DataBlockEncoding {
        self.encoder.data_block_encoding()
    }

    pub fn uses_encoded_scanner(&self) -> bool {
        self.encoder.uses_encoded_scanner()
    }

    /// Total on-disk bytes of all data blocks.
    pub fn data_size(&self) -> u64 {
        self.entries.iter().map(|e| u64::from(e.on_disk_size)).sum()
    }

    /// Read, verify and decode block `idx`. Only that block is read from disk.
    pub fn read_block(&mut self, idx: u64, is_compaction: bool) -> Result<DecodedBlock> {
        let entry = self.entries.get(idx as usize).ok_or_else(|| {
            Error::corrupt(format!(
                "block index {idx} out of range (total {})",
                self.trailer.block_count
            ))
        })?;

        self.file.seek(SeekFrom::Start(entry.offset))?;
        let mut bytes = vec![0u8; entry.on_disk_size as usize];
        self.file.read_exact(&mut bytes)?;

        let block = Block::parse(bytes)?;
        let cells = block.decode(self.encoder, &self.decoding)?;
        Ok(DecodedBlock {
            header: block.header().clone(),
            cells,
            encoding_in_cache: self.encoder.effective_encoding_in_cache(is_compaction),
        })
    }

    /// Decode every block in file order.
    pub fn scan(&mut self) -> Result<Vec<Cell>> {
        let mut cells = Vec::with_capacity(self.trailer.entry_count.min(1 << 20) as usize);
        for idx in 0..self.block_count() {
            cells.extend(self.read_block(idx, false)?.cells);
        }
        Ok(cells)
    }
}

/// Read only the trailer of a data file, e.g. to pick its compressor.
pub fn peek_trailer(path: impl AsRef<Path>) -> Result<Trailer> {
    let mut file = File::open(path)?;
    read_trailer(&mut file)
}

fn read_trailer(file: &mut File) -> Result<Trailer> {
    let file_len = file.seek(SeekFrom::End(0))?;
    if file_len < TRAILER_SIZE as u64 {
        return Err(Error::corrupt(format!(
            "file of {file_len} bytes is too short for a {TRAILER_SIZE}-byte trailer"
        )));
    }
    file.seek(SeekFrom::End(-(TRAILER_SIZE as i64)))?;
    let mut buf = [0u8; TRAILER_SIZE];
    file.read_exact(&mut buf)?;
    Trailer::from_bytes(&buf)
}

fn read_span(file: &mut File, start: u64, end: u64) -> Result<Vec<u8>> {
    file.seek(SeekFrom::Start(start))?;
    let mut buf = vec![0u8; (end - start) as usize];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

/// The write-side settings a file records about itself.
fn config_from_trailer(trailer: &Trailer) -> EncodingConfig {
    EncodingConfig {
        data_block_encoding: trailer.encoding,
        block_size: trailer.block_size,
        compression: trailer.compression,
        checksum: trailer.checksum_type,
        bytes_per_checksum: trailer.bytes_per_checksum,
        include_mvcc: trailer.has_flag(FLAG_INCLUDES_MVCC),
        include_tags: trailer.has_flag(FLAG_INCLUDES_TAGS),
        ..EncodingConfig::default()
    }
}
