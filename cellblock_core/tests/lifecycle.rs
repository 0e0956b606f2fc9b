/// Block encoding lifecycle: the start / encode* / end protocol every
/// strategy follows, exercised through the no-op strategy.
use std::io;
use std::sync::Arc;

use cellblock_codecs::{NoCompression, ZstdCompressor};
use cellblock_core::{
    encoder_for, Block, BlockHeader, BlockSink, BlockState, BlockType, BlockWriter, Cell, ChecksumType,
    DataBlockEncoder, DataBlockEncoding, DecodingContext, EncodingConfig, EncodingContext, Error, FileContext,
    FileInfo, NoOpDataBlockEncoder, HEADER_SIZE,
};

// ── helpers ───────────────────────────────────────────────────────────────

static NO_OP: &NoOpDataBlockEncoder = &NoOpDataBlockEncoder::INSTANCE;

fn file_context() -> Arc<FileContext> {
    Arc::new(FileContext::new(Arc::new(NoCompression)))
}

fn dummy_header() -> [u8; HEADER_SIZE] {
    BlockHeader::dummy(BlockType::Data, ChecksumType::Xxh3, 16 * 1024)
}

fn no_op_context() -> EncodingContext {
    NO_OP.new_encoding_context(&EncodingConfig::default(), &dummy_header(), file_context())
}

fn started(ctx: &mut EncodingContext) -> Vec<u8> {
    let mut out = dummy_header().to_vec();
    NO_OP.start_block_encoding(ctx, &mut out).unwrap();
    out
}

/// A sink that fails once more than `capacity` bytes are written.
struct CappedSink {
    buf: Vec<u8>,
    capacity: usize,
}

impl io::Write for CappedSink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.buf.len() + data.len() > self.capacity {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "sink full"));
        }
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BlockSink for CappedSink {
    fn position(&self) -> u64 {
        self.buf.len() as u64
    }

    fn bytes(&self) -> &[u8] {
        &self.buf
    }
}

// ── identity and policy ───────────────────────────────────────────────────

#[test]
fn test_no_op_identity_and_policy() {
    assert_eq!(NO_OP.data_block_encoding(), DataBlockEncoding::None);
    assert!(!NO_OP.uses_encoded_scanner());
    assert_eq!(NO_OP.effective_encoding_in_cache(true), DataBlockEncoding::None);
    assert_eq!(NO_OP.effective_encoding_in_cache(false), DataBlockEncoding::None);
    assert_eq!(NO_OP.to_string(), "NoOpDataBlockEncoder");
}

#[test]
fn test_encoder_for_dispatches_by_identity() {
    let encoder = encoder_for(DataBlockEncoding::None).unwrap();
    assert_eq!(encoder.data_block_encoding(), DataBlockEncoding::None);

    for unsupported in [
        DataBlockEncoding::Prefix,
        DataBlockEncoding::Diff,
        DataBlockEncoding::FastDiff,
        DataBlockEncoding::RowIndexV1,
    ] {
        assert!(matches!(
            encoder_for(unsupported),
            Err(Error::UnsupportedEncoding(e)) if e == unsupported
        ));
    }
}

#[test]
fn test_save_metadata_leaves_file_info_untouched() {
    let mut info = FileInfo::new();
    cellblock_core::MetadataWriter::append_file_info(&mut info, b"user.key", b"user.value").unwrap();
    let before = info.to_bytes();

    NO_OP.save_metadata(&mut info).unwrap();

    assert_eq!(info.to_bytes(), before);
}

// ── contexts ──────────────────────────────────────────────────────────────

#[test]
fn test_contexts_are_tagged_and_own_their_header() {
    let header = dummy_header();
    let a = NO_OP.new_encoding_context(&EncodingConfig::default(), &header, file_context());
    let b = NO_OP.new_encoding_context(&EncodingConfig::default(), &header, file_context());

    assert_eq!(a.encoding(), DataBlockEncoding::None);
    assert_eq!(a.block_state(), BlockState::Idle);
    assert_eq!(a.dummy_header(), header.as_slice());
    assert_ne!(a.dummy_header().as_ptr(), b.dummy_header().as_ptr());

    let d = NO_OP.new_decoding_context(&EncodingConfig::default(), file_context());
    assert_eq!(d.encoding(), DataBlockEncoding::None);
}

#[test]
fn test_foreign_context_is_rejected() {
    let mut ctx =
        EncodingContext::for_delta_encoding(DataBlockEncoding::Prefix, &dummy_header(), file_context()).unwrap();
    let mut out = dummy_header().to_vec();

    let err = NO_OP.start_block_encoding(&mut ctx, &mut out).unwrap_err();
    assert!(
        matches!(
            err,
            Error::IncompatibleContext {
                strategy: DataBlockEncoding::None,
                context: DataBlockEncoding::Prefix
            }
        ),
        "got {err}"
    );
    assert!(err.is_protocol_violation());
    assert!(!ctx.is_open(), "a rejected start must not open the block");
    assert_eq!(out.len(), HEADER_SIZE, "a rejected start must not touch the output");
}

#[test]
fn test_foreign_context_prepares_encoded_blocks() {
    // What a delta strategy would get from the shared context implementation.
    let mut ctx =
        EncodingContext::for_delta_encoding(DataBlockEncoding::Prefix, &dummy_header(), file_context()).unwrap();
    let mut out = dummy_header().to_vec();
    ctx.prepare_encoding(&mut out).unwrap();
    assert_eq!(&out[HEADER_SIZE..], &DataBlockEncoding::Prefix.id_bytes());
}

#[test]
fn test_none_contexts_only_come_from_the_no_op_strategy() {
    let encoding = EncodingContext::for_delta_encoding(DataBlockEncoding::None, &dummy_header(), file_context());
    assert!(matches!(encoding, Err(Error::Config(_))));
    let decoding = DecodingContext::for_delta_encoding(DataBlockEncoding::None, file_context());
    assert!(matches!(decoding, Err(Error::Config(_))));
}

// ── protocol ──────────────────────────────────────────────────────────────

#[test]
fn test_encode_before_start_is_a_protocol_violation() {
    let mut ctx = no_op_context();
    let mut out = dummy_header().to_vec();

    let err = NO_OP.encode(&Cell::new("a", "1"), &mut ctx, &mut out).unwrap_err();
    assert!(
        matches!(err, Error::Protocol { op: "encode", state: BlockState::Idle }),
        "got {err}"
    );
    assert_eq!(out.len(), HEADER_SIZE);
}

#[test]
fn test_double_start_is_a_protocol_violation() {
    let mut ctx = no_op_context();
    let mut out = started(&mut ctx);
    NO_OP.encode(&Cell::new("a", "1"), &mut ctx, &mut out).unwrap();
    let written = out.len();

    let err = NO_OP.start_block_encoding(&mut ctx, &mut out).unwrap_err();
    assert!(
        matches!(err, Error::Protocol { state: BlockState::Open, .. }),
        "got {err}"
    );
    // The open block survives the rejected call.
    assert_eq!(out.len(), written);
    assert_eq!(ctx.encoding_state().unwrap().cells_written(), 1);
}

#[test]
fn test_end_without_start_is_a_protocol_violation() {
    let mut ctx = no_op_context();
    let mut out = dummy_header().to_vec();
    let err = NO_OP
        .end_block_encoding(&mut ctx, &mut out, BlockType::Data)
        .unwrap_err();
    assert!(matches!(err, Error::Protocol { state: BlockState::Idle, .. }), "got {err}");
    assert!(ctx.take_on_disk_block().is_err());
}

#[test]
fn test_encode_after_end_is_a_protocol_violation() {
    let mut ctx = no_op_context();
    let mut out = started(&mut ctx);
    NO_OP.end_block_encoding(&mut ctx, &mut out, BlockType::Data).unwrap();

    let err = NO_OP.encode(&Cell::new("a", "1"), &mut ctx, &mut out).unwrap_err();
    assert!(err.is_protocol_violation());
}

#[test]
fn test_state_counts_bytes_and_is_dropped_at_end() {
    let mut ctx = no_op_context();
    let mut out = started(&mut ctx);
    let cells = [Cell::new("a", "1"), Cell::new("bb", "22")];
    for cell in &cells {
        NO_OP.encode(cell, &mut ctx, &mut out).unwrap();
    }

    let expected: u64 = cells.iter().map(|c| c.serialized_len(false, true) as u64).sum();
    let state = ctx.encoding_state().unwrap();
    assert_eq!(state.owner(), DataBlockEncoding::None);
    assert_eq!(state.cells_written(), 2);
    assert_eq!(state.unencoded_data_size_written(), expected);
    assert_eq!(state.encoded_data_size_written(), expected);
    assert_eq!(out.len() as u64, HEADER_SIZE as u64 + expected);

    NO_OP.end_block_encoding(&mut ctx, &mut out, BlockType::Data).unwrap();
    assert!(ctx.encoding_state().is_none());
    assert_eq!(ctx.block_type(), BlockType::Data);
    assert_eq!(ctx.blocks_finished(), 1);

    // The next block starts from fresh counters.
    let mut out = started(&mut ctx);
    NO_OP.encode(&Cell::new("c", "3"), &mut ctx, &mut out).unwrap();
    assert_eq!(ctx.encoding_state().unwrap().cells_written(), 1);
}

#[test]
fn test_io_failure_abandons_the_block() {
    let mut ctx = no_op_context();
    let mut sink = CappedSink {
        buf: dummy_header().to_vec(),
        capacity: HEADER_SIZE + 16,
    };
    NO_OP.start_block_encoding(&mut ctx, &mut sink).unwrap();
    NO_OP.encode(&Cell::new("a", "1"), &mut ctx, &mut sink).unwrap();
    let written = sink.buf.len();

    let err = NO_OP
        .encode(&Cell::new("b", "a value too long for the sink"), &mut ctx, &mut sink)
        .unwrap_err();
    match err {
        Error::Io(e) => assert_eq!(e.kind(), io::ErrorKind::WriteZero),
        other => panic!("expected io error, got {other}"),
    }
    assert_eq!(sink.buf.len(), written, "no fragment of the failed cell is left behind");

    // The block cannot be finished or handed out.
    assert!(!ctx.is_open());
    let err = NO_OP
        .end_block_encoding(&mut ctx, &mut sink, BlockType::Data)
        .unwrap_err();
    assert!(
        matches!(
            err,
            Error::Protocol {
                state: BlockState::Idle,
                ..
            }
        ),
        "got {err}"
    );
    assert!(ctx.take_on_disk_block().is_err());

    // The context itself stays usable.
    let mut fresh = CappedSink {
        buf: dummy_header().to_vec(),
        capacity: HEADER_SIZE + 64,
    };
    NO_OP.start_block_encoding(&mut ctx, &mut fresh).unwrap();
    NO_OP.encode(&Cell::new("c", "3"), &mut ctx, &mut fresh).unwrap();
    assert_eq!(ctx.encoding_state().unwrap().cells_written(), 1);
}

// ── blocks ────────────────────────────────────────────────────────────────

#[test]
fn test_empty_block_is_well_formed() {
    let ctx_file = file_context();
    let mut writer = BlockWriter::new(NO_OP, &EncodingConfig::default(), ctx_file.clone());
    writer.start_block().unwrap();
    let block = writer.finish_block(u64::MAX).unwrap();

    assert_eq!(block.cells, 0);
    assert_eq!(block.header.uncompressed_size_without_header, 0);

    let parsed = Block::parse(block.bytes).unwrap();
    let decoding = NO_OP.new_decoding_context(&EncodingConfig::default(), ctx_file);
    assert!(parsed.decode(NO_OP, &decoding).unwrap().is_empty());
}

#[test]
fn test_two_cell_block_round_trip() {
    let ctx_file = Arc::new(FileContext::new(Arc::new(ZstdCompressor::default())));
    let mut writer = BlockWriter::new(NO_OP, &EncodingConfig::default(), ctx_file.clone());
    let cells = vec![Cell::new("a", "1"), Cell::new("b", "2")];

    writer.start_block().unwrap();
    for cell in &cells {
        writer.write(cell).unwrap();
    }
    let block = writer.finish_block(u64::MAX).unwrap();
    assert_eq!(block.first_key, b"a");
    assert_eq!(block.header.block_type, BlockType::Data);

    let parsed = Block::parse(block.bytes).unwrap();
    let decoding = NO_OP.new_decoding_context(&EncodingConfig::default(), ctx_file);
    assert_eq!(parsed.decode(NO_OP, &decoding).unwrap(), cells);
}

#[test]
fn test_block_writer_rejects_nested_start() {
    let mut writer = BlockWriter::new(NO_OP, &EncodingConfig::default(), file_context());
    writer.start_block().unwrap();
    writer.write(&Cell::new("a", "1")).unwrap();
    assert!(writer.start_block().unwrap_err().is_protocol_violation());
    assert_eq!(writer.cells_written(), 1);
}

#[test]
fn test_block_writer_drops_block_after_failed_write() {
    let config = EncodingConfig {
        include_tags: true,
        ..EncodingConfig::default()
    };
    let ctx_file = Arc::new(FileContext::from_config(&config, Arc::new(NoCompression)));
    let mut writer = BlockWriter::new(NO_OP, &config, ctx_file.clone());
    writer.start_block().unwrap();
    writer.write(&Cell::new("a", "1")).unwrap();

    let oversized = Cell::new("b", "2").with_tags(vec![0u8; 70_000]);
    assert!(matches!(writer.write(&oversized), Err(Error::Io(_))));
    assert!(!writer.is_open());
    assert_eq!(writer.cells_written(), 0);
    assert!(writer.finish_block(u64::MAX).unwrap_err().is_protocol_violation());

    // A new block starts clean and carries none of the abandoned cells.
    writer.start_block().unwrap();
    writer.write(&Cell::new("c", "3")).unwrap();
    let block = writer.finish_block(u64::MAX).unwrap();
    assert_eq!(block.first_key, b"c");
    let parsed = Block::parse(block.bytes).unwrap();
    let decoding = NO_OP.new_decoding_context(&config, ctx_file);
    assert_eq!(parsed.decode(NO_OP, &decoding).unwrap(), vec![Cell::new("c", "3")]);
}

#[test]
fn test_flipped_byte_fails_checksum() {
    let mut writer = BlockWriter::new(NO_OP, &EncodingConfig::default(), file_context());
    writer.start_block().unwrap();
    writer.write(&Cell::new("key", "value")).unwrap();
    let mut bytes = writer.finish_block(u64::MAX).unwrap().bytes;

    bytes[HEADER_SIZE + 3] ^= 0x01;
    assert!(matches!(Block::parse(bytes), Err(Error::Corrupt(_))));
}

#[test]
fn test_decoding_context_of_other_strategy_is_rejected() {
    let mut writer = BlockWriter::new(NO_OP, &EncodingConfig::default(), file_context());
    writer.start_block().unwrap();
    writer.write(&Cell::new("a", "1")).unwrap();
    let parsed = Block::parse(writer.finish_block(u64::MAX).unwrap().bytes).unwrap();

    let foreign = DecodingContext::for_delta_encoding(DataBlockEncoding::Diff, file_context()).unwrap();
    assert!(matches!(
        parsed.decode(NO_OP, &foreign),
        Err(Error::IncompatibleContext { .. })
    ));
}
