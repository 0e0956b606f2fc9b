use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ── Encoding IDs ───────────────────────────────────────────────────────────

pub const ENCODING_NONE: u16 = 0;
pub const ENCODING_PREFIX: u16 = 2;
pub const ENCODING_DIFF: u16 = 3;
pub const ENCODING_FAST_DIFF: u16 = 4;
pub const ENCODING_ROW_INDEX_V1: u16 = 7;

/// Identity of the strategy that produced a data block.
///
/// The id is persisted in the file trailer so a reader can pick the matching
/// decoder without external hints. The value written at encode time is the
/// value the reader must use; there is no renegotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataBlockEncoding {
    /// Cells are written verbatim.
    #[default]
    None,
    Prefix,
    Diff,
    FastDiff,
    RowIndexV1,
}

impl DataBlockEncoding {
    pub const ALL: [DataBlockEncoding; 5] = [
        DataBlockEncoding::None,
        DataBlockEncoding::Prefix,
        DataBlockEncoding::Diff,
        DataBlockEncoding::FastDiff,
        DataBlockEncoding::RowIndexV1,
    ];

    /// Stable id stored on disk.
    pub fn id(self) -> u16 {
        match self {
            DataBlockEncoding::None => ENCODING_NONE,
            DataBlockEncoding::Prefix => ENCODING_PREFIX,
            DataBlockEncoding::Diff => ENCODING_DIFF,
            DataBlockEncoding::FastDiff => ENCODING_FAST_DIFF,
            DataBlockEncoding::RowIndexV1 => ENCODING_ROW_INDEX_V1,
        }
    }

    pub fn from_id(id: u16) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|e| e.id() == id)
            .ok_or_else(|| Error::corrupt(format!("unknown data block encoding id {id}")))
    }

    pub fn name(self) -> &'static str {
        match self {
            DataBlockEncoding::None => "NONE",
            DataBlockEncoding::Prefix => "PREFIX",
            DataBlockEncoding::Diff => "DIFF",
            DataBlockEncoding::FastDiff => "FAST_DIFF",
            DataBlockEncoding::RowIndexV1 => "ROW_INDEX_V1",
        }
    }

    /// Bytes of the id as written at the head of an encoded block body.
    pub fn id_bytes(self) -> [u8; 2] {
        self.id().to_le_bytes()
    }
}

impl fmt::Display for DataBlockEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataBlockEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|e| e.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::Config(format!("unknown data block encoding '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_resolve_back() {
        for e in DataBlockEncoding::ALL {
            assert_eq!(DataBlockEncoding::from_id(e.id()).unwrap(), e);
        }
        assert!(DataBlockEncoding::from_id(1).is_err());
    }

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("fast_diff".parse::<DataBlockEncoding>().unwrap(), DataBlockEncoding::FastDiff);
        assert_eq!("NONE".parse::<DataBlockEncoding>().unwrap(), DataBlockEncoding::None);
        assert!("snappy".parse::<DataBlockEncoding>().is_err());
    }
}
