use std::io;

use thiserror::Error;

use crate::compression::CompressionAlgorithm;
use crate::encoding::DataBlockEncoding;

/// Lifecycle position of an [`EncodingContext`](crate::EncodingContext).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// No block is open; `start_block_encoding` is the only legal call.
    Idle,
    /// A block is open; `encode` and `end_block_encoding` are legal.
    Open,
}

impl std::fmt::Display for BlockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockState::Idle => f.write_str("idle"),
            BlockState::Open => f.write_str("open"),
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A lifecycle call was made out of order.
    #[error("protocol violation: `{op}` called while the encoding context is {state}")]
    Protocol { op: &'static str, state: BlockState },

    /// A strategy was handed a context it did not manufacture.
    #[error("{strategy} only accepts encoding contexts it created, got one created by {context}")]
    IncompatibleContext {
        strategy: DataBlockEncoding,
        context: DataBlockEncoding,
    },

    /// The open block's encoding state belongs to another strategy.
    #[error("encoding state was prepared by {state}, cannot encode with {strategy}")]
    IncompatibleState {
        strategy: DataBlockEncoding,
        state: DataBlockEncoding,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("{algorithm} compression failed: {source}")]
    Compression {
        algorithm: CompressionAlgorithm,
        #[source]
        source: anyhow::Error,
    },

    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("no encoder available for data block encoding {0}")]
    UnsupportedEncoding(DataBlockEncoding),

    /// The file was written with a different compressor than the one supplied.
    #[error("compression mismatch: file uses {file} but the supplied compressor is {supplied}")]
    CompressionMismatch {
        file: CompressionAlgorithm,
        supplied: CompressionAlgorithm,
    },

    #[error("cell out of order: {current:?} sorts before previous key {previous:?}")]
    OutOfOrder { previous: Vec<u8>, current: Vec<u8> },

    #[error("invalid configuration: {0}")]
    Config(String),

    /// An earlier append or flush failed; the file cannot be completed.
    #[error("writer is unusable after an earlier failure; the file is incomplete")]
    Poisoned,
}

impl Error {
    /// True for lifecycle misuse: out-of-order calls and foreign contexts or states.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Error::Protocol { .. } | Error::IncompatibleContext { .. } | Error::IncompatibleState { .. }
        )
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Error::Corrupt(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
