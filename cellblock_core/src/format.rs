use crate::checksum::ChecksumType;
use crate::compression::CompressionAlgorithm;
use crate::encoding::DataBlockEncoding;
use crate::error::{Error, Result};

/// Fixed size of a block header in bytes.
///   magic[8] + on_disk_size_without_header:u32 + uncompressed_size_without_header:u32
///   + prev_block_offset:u64 + checksum_type:u8 + bytes_per_checksum:u32
///   + on_disk_data_size_with_header:u32
///   = 8 + 4 + 4 + 8 + 1 + 4 + 4 = 33
pub const HEADER_SIZE: usize = 33;

/// Fixed size of the file trailer in bytes.
///   magic[8] + version:u16 + encoding_id:u16 + compression_id:u8 + checksum_type:u8
///   + flags:u8 + reserved:u8 + file_info_offset:u64 + index_offset:u64
///   + block_count:u64 + entry_count:u64 + bytes_per_checksum:u32 + block_size:u32
///   = 8 + 2 + 2 + 1 + 1 + 1 + 1 + 8 + 8 + 8 + 8 + 4 + 4 = 56
pub const TRAILER_SIZE: usize = 56;

pub const TRAILER_MAGIC: &[u8; 8] = b"CBLKTRL1";

pub const FORMAT_VERSION: u16 = 1;

/// `prev_block_offset` of the first block in a file.
pub const NO_PREV_BLOCK: u64 = u64::MAX;

// ── Trailer flags ──────────────────────────────────────────────────────────

/// Cells carry a varint sequence id.
pub const FLAG_INCLUDES_MVCC: u8 = 1 << 0;

/// Cells carry a tags section.
pub const FLAG_INCLUDES_TAGS: u8 = 1 << 1;

// ── Block type ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    /// Cells written verbatim.
    Data,
    /// Cells written by a non-`NONE` strategy; the body starts with the encoding id.
    EncodedData,
}

impl BlockType {
    pub fn magic(self) -> &'static [u8; 8] {
        match self {
            BlockType::Data => b"DATABLK*",
            BlockType::EncodedData => b"DATABLKE",
        }
    }

    pub fn from_magic(magic: &[u8]) -> Result<Self> {
        [BlockType::Data, BlockType::EncodedData]
            .into_iter()
            .find(|t| t.magic().as_slice() == magic)
            .ok_or_else(|| Error::corrupt(format!("invalid block magic {:?}", String::from_utf8_lossy(magic))))
    }
}

// ── Block header ───────────────────────────────────────────────────────────

/// Decoded representation of the 33-byte block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub block_type: BlockType,
    /// Compressed body plus trailing checksums.
    pub on_disk_size_without_header: u32,
    pub uncompressed_size_without_header: u32,
    pub prev_block_offset: u64,
    pub checksum_type: ChecksumType,
    pub bytes_per_checksum: u32,
    /// Header plus compressed body; the span covered by checksums.
    pub on_disk_data_size_with_header: u32,
}

impl BlockHeader {
    /// Placeholder written at block start and back-filled once the block is finished.
    pub fn dummy(block_type: BlockType, checksum_type: ChecksumType, bytes_per_checksum: u32) -> [u8; HEADER_SIZE] {
        Self {
            block_type,
            on_disk_size_without_header: 0,
            uncompressed_size_without_header: 0,
            prev_block_offset: NO_PREV_BLOCK,
            checksum_type,
            bytes_per_checksum,
            on_disk_data_size_with_header: 0,
        }
        .to_bytes()
    }

    /// Serialize to exactly `HEADER_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(self.block_type.magic());
        buf[8..12].copy_from_slice(&self.on_disk_size_without_header.to_le_bytes());
        buf[12..16].copy_from_slice(&self.uncompressed_size_without_header.to_le_bytes());
        buf[16..24].copy_from_slice(&self.prev_block_offset.to_le_bytes());
        buf[24] = self.checksum_type.code();
        buf[25..29].copy_from_slice(&self.bytes_per_checksum.to_le_bytes());
        buf[29..33].copy_from_slice(&self.on_disk_data_size_with_header.to_le_bytes());
        buf
    }

    /// Deserialize from the first `HEADER_SIZE` bytes of `buf`, checking the magic.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::corrupt(format!(
                "block of {} bytes is shorter than its {HEADER_SIZE}-byte header",
                buf.len()
            )));
        }
        Ok(Self {
            block_type: BlockType::from_magic(&buf[0..8])?,
            on_disk_size_without_header: le_u32(&buf[8..12]),
            uncompressed_size_without_header: le_u32(&buf[12..16]),
            prev_block_offset: le_u64(&buf[16..24]),
            checksum_type: ChecksumType::from_code(buf[24])?,
            bytes_per_checksum: le_u32(&buf[25..29]),
            on_disk_data_size_with_header: le_u32(&buf[29..33]),
        })
    }

    /// Total bytes this block occupies in the file.
    pub fn on_disk_size_with_header(&self) -> usize {
        HEADER_SIZE + self.on_disk_size_without_header as usize
    }
}

// ── Trailer ────────────────────────────────────────────────────────────────

/// Decoded representation of the 56-byte file trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trailer {
    pub version: u16,
    /// Strategy that wrote every data block in the file.
    pub encoding: DataBlockEncoding,
    pub compression: CompressionAlgorithm,
    pub checksum_type: ChecksumType,
    pub flags: u8,
    pub file_info_offset: u64,
    pub index_offset: u64,
    pub block_count: u64,
    pub entry_count: u64,
    pub bytes_per_checksum: u32,
    pub block_size: u32,
}

impl Trailer {
    /// Serialize to exactly `TRAILER_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; TRAILER_SIZE] {
        let mut buf = [0u8; TRAILER_SIZE];
        buf[0..8].copy_from_slice(TRAILER_MAGIC);
        buf[8..10].copy_from_slice(&self.version.to_le_bytes());
        buf[10..12].copy_from_slice(&self.encoding.id().to_le_bytes());
        buf[12] = self.compression.id();
        buf[13] = self.checksum_type.code();
        buf[14] = self.flags;
        // buf[15] reserved, stays zero
        buf[16..24].copy_from_slice(&self.file_info_offset.to_le_bytes());
        buf[24..32].copy_from_slice(&self.index_offset.to_le_bytes());
        buf[32..40].copy_from_slice(&self.block_count.to_le_bytes());
        buf[40..48].copy_from_slice(&self.entry_count.to_le_bytes());
        buf[48..52].copy_from_slice(&self.bytes_per_checksum.to_le_bytes());
        buf[52..56].copy_from_slice(&self.block_size.to_le_bytes());
        buf
    }

    /// Deserialize from `TRAILER_SIZE` bytes, checking magic and version.
    pub fn from_bytes(buf: &[u8; TRAILER_SIZE]) -> Result<Self> {
        if &buf[0..8] != TRAILER_MAGIC {
            return Err(Error::corrupt("invalid trailer magic, not a cellblock data file"));
        }
        let version = u16::from_le_bytes([buf[8], buf[9]]);
        if version != FORMAT_VERSION {
            return Err(Error::corrupt(format!(
                "unsupported format version {version} (only {FORMAT_VERSION} is supported)"
            )));
        }
        Ok(Self {
            version,
            encoding: DataBlockEncoding::from_id(u16::from_le_bytes([buf[10], buf[11]]))?,
            compression: CompressionAlgorithm::from_id(buf[12])?,
            checksum_type: ChecksumType::from_code(buf[13])?,
            flags: buf[14],
            file_info_offset: le_u64(&buf[16..24]),
            index_offset: le_u64(&buf[24..32]),
            block_count: le_u64(&buf[32..40]),
            entry_count: le_u64(&buf[40..48]),
            bytes_per_checksum: le_u32(&buf[48..52]),
            block_size: le_u32(&buf[52..56]),
        })
    }

    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

// ── Block index entry ──────────────────────────────────────────────────────

/// Locates one data block and records its first key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockIndexEntry {
    /// Byte offset of the block from the start of the file.
    pub offset: u64,
    /// Header + body + checksums.
    pub on_disk_size: u32,
    pub first_key: Vec<u8>,
}

impl BlockIndexEntry {
    /// Append `offset:u64 | on_disk_size:u32 | first_key_len:u32 | first_key`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&self.on_disk_size.to_le_bytes());
        out.extend_from_slice(&(self.first_key.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.first_key);
    }

    /// Read one entry from the front of `buf`, advancing it.
    pub fn read_from(buf: &mut &[u8]) -> Result<Self> {
        let b: &[u8] = *buf;
        if b.len() < 16 {
            return Err(Error::corrupt("truncated block index entry"));
        }
        let offset = le_u64(&b[0..8]);
        let on_disk_size = le_u32(&b[8..12]);
        let key_len = le_u32(&b[12..16]) as usize;
        let rest = &b[16..];
        if rest.len() < key_len {
            return Err(Error::corrupt("truncated block index key"));
        }
        let first_key = rest[..key_len].to_vec();
        *buf = &rest[key_len..];
        Ok(Self {
            offset,
            on_disk_size,
            first_key,
        })
    }
}

pub(crate) fn le_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

pub(crate) fn le_u64(b: &[u8]) -> u64 {
    u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_fixed() {
        let header = BlockHeader {
            block_type: BlockType::EncodedData,
            on_disk_size_without_header: 0x0102_0304,
            uncompressed_size_without_header: 9,
            prev_block_offset: 77,
            checksum_type: ChecksumType::Xxh3,
            bytes_per_checksum: 512,
            on_disk_data_size_with_header: 42,
        };
        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..8], b"DATABLKE");
        assert_eq!(&bytes[8..12], &[4, 3, 2, 1]);
        assert_eq!(BlockHeader::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn dummy_header_has_no_sizes() {
        let dummy = BlockHeader::dummy(BlockType::Data, ChecksumType::Null, 16);
        let parsed = BlockHeader::from_bytes(&dummy).unwrap();
        assert_eq!(parsed.on_disk_size_without_header, 0);
        assert_eq!(parsed.prev_block_offset, NO_PREV_BLOCK);
    }

    #[test]
    fn trailer_rejects_bad_magic() {
        let mut bytes = Trailer {
            version: FORMAT_VERSION,
            encoding: DataBlockEncoding::None,
            compression: CompressionAlgorithm::Zstd,
            checksum_type: ChecksumType::Xxh3,
            flags: FLAG_INCLUDES_MVCC,
            file_info_offset: 1,
            index_offset: 2,
            block_count: 3,
            entry_count: 4,
            bytes_per_checksum: 5,
            block_size: 6,
        }
        .to_bytes();
        assert!(Trailer::from_bytes(&bytes).unwrap().has_flag(FLAG_INCLUDES_MVCC));
        bytes[0] = b'X';
        assert!(matches!(Trailer::from_bytes(&bytes), Err(Error::Corrupt(_))));
    }
}
