use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cellblock_codecs::{compressor_by_id, compressor_from_config};
use cellblock_core::file_info::{AVG_KEY_LEN, AVG_VALUE_LEN, MAX_SEQ_ID};
use cellblock_core::{
    encoder_for, peek_trailer, Cell, CompressionAlgorithm, EncodingConfig, FileContext, Reader, Writer,
};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "cellblock",
    about = "Write, inspect, and randomly access cellblock data files",
    version
)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write tab-separated cells into a data file
    ///
    /// Each input line is `key<TAB>value[<TAB>sequence_id[<TAB>tags]]`, in
    /// key order.
    Write {
        /// Source file ("-" reads stdin)
        input: PathBuf,
        /// Destination data file
        output: PathBuf,
        /// TOML encoding config; flags below override it
        #[arg(long)]
        config: Option<PathBuf>,
        /// Compression: none | gz | lz4 | zstd
        #[arg(short, long)]
        compression: Option<CompressionAlgorithm>,
        /// Zstd compression level (1–22, only used with zstd)
        #[arg(long)]
        zstd_level: Option<i32>,
        /// Unencoded bytes per block
        #[arg(short, long)]
        block_size: Option<u32>,
        /// Store each cell's tags
        #[arg(long)]
        include_tags: bool,
    },
    /// Print every cell as a tab-separated line
    Dump {
        /// Data file
        file: PathBuf,
    },
    /// Print trailer, file info and block index statistics
    Inspect {
        /// Data file to inspect
        file: PathBuf,
        /// Print per-block details
        #[arg(long)]
        blocks: bool,
    },
    /// Decode a single block by index
    ///
    /// Only the requested block is read from disk.
    ReadBlock {
        /// Data file
        file: PathBuf,
        /// Zero-based block index to read
        #[arg(short, long)]
        index: u64,
        /// Read as compaction would (affects the reported cache encoding)
        #[arg(long)]
        compaction: bool,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Open a data file with the compressor its trailer names.
fn open_reader(path: &Path) -> anyhow::Result<Reader> {
    let trailer = peek_trailer(path).with_context(|| format!("reading trailer of {:?}", path))?;
    let compressor = compressor_by_id(trailer.compression.id())?;
    let reader = Reader::open(path, compressor).with_context(|| format!("opening {:?}", path))?;
    Ok(reader)
}

fn parse_cell(line: &str) -> anyhow::Result<Cell> {
    let mut fields = line.split('\t');
    let key = fields.next().unwrap_or_default();
    let value = fields.next().context("missing value column")?;
    let mut cell = Cell::new(key, value);
    if let Some(seq) = fields.next() {
        let seq: u64 = seq
            .parse()
            .with_context(|| format!("invalid sequence id {:?}", seq))?;
        cell = cell.with_sequence_id(seq);
    }
    if let Some(tags) = fields.next() {
        cell = cell.with_tags(tags);
    }
    if fields.next().is_some() {
        anyhow::bail!("too many columns");
    }
    Ok(cell)
}

fn print_cell(out: &mut impl Write, cell: &Cell) -> io::Result<()> {
    write!(out, "{}\t{}\t{}", lossy(cell.key()), lossy(cell.value()), cell.sequence_id())?;
    if !cell.tags().is_empty() {
        write!(out, "\t{}", lossy(cell.tags()))?;
    }
    writeln!(out)
}

// ── Subcommand implementations ─────────────────────────────────────────────

struct WriteOptions {
    config: Option<PathBuf>,
    compression: Option<CompressionAlgorithm>,
    zstd_level: Option<i32>,
    block_size: Option<u32>,
    include_tags: bool,
}

fn run_write(input: PathBuf, output: PathBuf, opts: WriteOptions) -> anyhow::Result<()> {
    let mut config = match &opts.config {
        Some(path) => EncodingConfig::load(path).with_context(|| format!("loading config {:?}", path))?,
        None => EncodingConfig::default(),
    };
    if let Some(compression) = opts.compression {
        config.compression = compression;
    }
    if let Some(level) = opts.zstd_level {
        config.zstd_level = level;
    }
    if let Some(block_size) = opts.block_size {
        config.block_size = block_size;
    }
    config.include_tags |= opts.include_tags;
    config.validate()?;
    debug!(?config, "write configuration");

    let encoder = encoder_for(config.data_block_encoding)?;
    let compressor = compressor_from_config(&config);
    let compressor_name = compressor.name();
    let file_context = Arc::new(FileContext::from_config(&config, compressor));
    let mut writer = Writer::create(&output, encoder, &config, file_context)
        .with_context(|| format!("creating output file {:?}", output))?;

    let src: Box<dyn BufRead> = if input.to_str() == Some("-") {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(&input).with_context(|| format!("opening input file {:?}", input))?;
        Box::new(BufReader::new(file))
    };

    let t0 = Instant::now();
    let mut raw_bytes = 0u64;
    for (lineno, line) in src.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let cell = parse_cell(&line).with_context(|| format!("line {}", lineno + 1))?;
        raw_bytes += (cell.key().len() + cell.value().len()) as u64;
        writer
            .append(&cell)
            .with_context(|| format!("line {}", lineno + 1))?;
    }
    let summary = writer.finish()?;
    let elapsed = t0.elapsed();

    eprintln!("  encoding    : {}", config.data_block_encoding);
    eprintln!("  compression : {}", compressor_name);
    eprintln!("  block size  : {}", human_bytes(config.block_size as u64));
    eprintln!("  blocks      : {}", summary.block_count);
    eprintln!("  cells       : {}", summary.entry_count);
    eprintln!("  raw size    : {}", human_bytes(raw_bytes));
    eprintln!("  file size   : {}", human_bytes(summary.file_size));
    if summary.file_size > 0 {
        eprintln!("  ratio       : {:.2}x", raw_bytes as f64 / summary.file_size as f64);
    }
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_dump(file: PathBuf) -> anyhow::Result<()> {
    let mut reader = open_reader(&file)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for idx in 0..reader.block_count() {
        for cell in reader.read_block(idx, false)?.cells {
            print_cell(&mut out, &cell)?;
        }
    }
    Ok(())
}

fn run_inspect(file: PathBuf, show_blocks: bool) -> anyhow::Result<()> {
    let reader = open_reader(&file)?;
    let trailer = reader.trailer();
    let file_size = std::fs::metadata(&file)?.len();

    println!("=== cellblock file: {:?} ===", file);
    println!();
    println!("  format version : {}", trailer.version);
    println!("  encoding       : {} (id={})", trailer.encoding, trailer.encoding.id());
    println!("  compression    : {} (id={})", trailer.compression, trailer.compression.id());
    println!(
        "  checksum       : {} every {}",
        trailer.checksum_type.name(),
        human_bytes(trailer.bytes_per_checksum as u64)
    );
    println!("  block size     : {}", human_bytes(trailer.block_size as u64));
    println!("  block count    : {}", reader.block_count());
    println!("  cell count     : {}", reader.entry_count());
    println!("  data blocks    : {}", human_bytes(reader.data_size()));
    println!("  file on disk   : {}", human_bytes(file_size));
    println!("  flags          : 0x{:02x}", trailer.flags);
    println!("  encoded scan   : {}", reader.uses_encoded_scanner());

    println!();
    println!("  file info ({} entries):", reader.file_info().len());
    for (key, value) in reader.file_info().iter() {
        let numeric = [AVG_KEY_LEN, AVG_VALUE_LEN, MAX_SEQ_ID].iter().any(|k| *k == key);
        let shown = if numeric && value.len() == 8 {
            let mut le = [0u8; 8];
            le.copy_from_slice(value);
            u64::from_le_bytes(le).to_string()
        } else {
            lossy(value)
        };
        println!("    {} = {}", lossy(key), shown);
    }

    if show_blocks {
        println!();
        println!("  {:>8}  {:>14}  {:>12}  {}", "block", "file offset", "on disk", "first key");
        println!("  {}", "-".repeat(60));
        for (i, e) in reader.entries().iter().enumerate() {
            println!(
                "  {:>8}  {:>14}  {:>12}  {}",
                i,
                e.offset,
                human_bytes(e.on_disk_size as u64),
                lossy(&e.first_key)
            );
        }
    }

    Ok(())
}

fn run_read_block(file: PathBuf, index: u64, compaction: bool) -> anyhow::Result<()> {
    let mut reader = open_reader(&file)?;
    let entry = reader
        .entries()
        .get(index as usize)
        .with_context(|| format!("block {} out of range (file has {})", index, reader.block_count()))?;

    eprintln!(
        "seeking to block {} (offset {} bytes from file start)...",
        index, entry.offset
    );

    let t0 = Instant::now();
    let block = reader.read_block(index, compaction)?;
    let elapsed = t0.elapsed();

    eprintln!(
        "  decoded {} cells in {:.3}ms",
        block.cells.len(),
        elapsed.as_secs_f64() * 1000.0
    );

    println!(
        "--- block {} ({:?}, {} on disk, {} uncompressed, cached as {}) ---",
        index,
        block.header.block_type,
        human_bytes(block.header.on_disk_size_with_header() as u64),
        human_bytes(block.header.uncompressed_size_without_header as u64),
        block.encoding_in_cache
    );
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for cell in &block.cells {
        print_cell(&mut out, cell)?;
    }
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.command {
        Commands::Write {
            input,
            output,
            config,
            compression,
            zstd_level,
            block_size,
            include_tags,
        } => run_write(
            input,
            output,
            WriteOptions {
                config,
                compression,
                zstd_level,
                block_size,
                include_tags,
            },
        ),
        Commands::Dump { file } => run_dump(file),
        Commands::Inspect { file, blocks } => run_inspect(file, blocks),
        Commands::ReadBlock {
            file,
            index,
            compaction,
        } => run_read_block(file, index, compaction),
    }
}
