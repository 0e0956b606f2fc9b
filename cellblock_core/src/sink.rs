use std::io::Write;

/// Sequential byte sink one block is written into.
///
/// Supplied by the block writer and scoped to one block. `bytes` exposes the
/// complete uncompressed block image (header placeholder plus body) so the
/// encoding context can run its post-encoding transform when the block ends.
pub trait BlockSink: Write {
    /// Bytes written so far, header placeholder included.
    fn position(&self) -> u64;

    fn bytes(&self) -> &[u8];
}

impl BlockSink for Vec<u8> {
    fn position(&self) -> u64 {
        self.len() as u64
    }

    fn bytes(&self) -> &[u8] {
        self
    }
}
