//! On-disk layout of a record stream.
//!
//! The whole file is one zstd stream. Decompressed, it reads:
//!
//! ```text
//! [4 bytes: magic "LIPS"]
//! [4 bytes: format version (little-endian u32)]
//! [1 byte:  record kind]
//! frame*
//! [8 bytes: sentinel frame, length 0 and CRC 0]
//! ```
//!
//! Each frame is:
//!
//! ```text
//! [4 bytes: payload length (little-endian u32)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [N bytes: payload (bincode-serialized record)]
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamError};

pub const MAGIC: [u8; 4] = *b"LIPS";
pub const FORMAT_VERSION: u32 = 1;
/// Magic + version + kind byte.
pub const STREAM_HEADER_SIZE: usize = 9;
/// Length + CRC.
pub const FRAME_HEADER_SIZE: usize = 8;

/// What every record of a stream is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    /// [`lip_types::LedgerCloseMeta`] records.
    Ledger,
    /// [`lip_types::LedgerEntry`] records.
    LedgerEntry,
}

impl RecordKind {
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Ledger => 1,
            Self::LedgerEntry => 2,
        }
    }

    pub fn from_byte(b: u8) -> Result<Self> {
        match b {
            1 => Ok(Self::Ledger),
            2 => Ok(Self::LedgerEntry),
            other => Err(StreamError::UnknownKind(other)),
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ledger => f.write_str("ledger"),
            Self::LedgerEntry => f.write_str("ledger entry"),
        }
    }
}

pub(crate) fn encode_header(kind: RecordKind) -> [u8; STREAM_HEADER_SIZE] {
    let mut buf = [0u8; STREAM_HEADER_SIZE];
    buf[..4].copy_from_slice(&MAGIC);
    buf[4..8].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf[8] = kind.to_byte();
    buf
}

pub(crate) fn decode_header(buf: &[u8; STREAM_HEADER_SIZE]) -> Result<RecordKind> {
    let magic = [buf[0], buf[1], buf[2], buf[3]];
    if magic != MAGIC {
        return Err(StreamError::BadMagic(magic));
    }
    let version = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    if version != FORMAT_VERSION {
        return Err(StreamError::UnsupportedVersion(version));
    }
    RecordKind::from_byte(buf[8])
}

pub(crate) fn encode_frame_header(payload: &[u8]) -> [u8; FRAME_HEADER_SIZE] {
    let mut buf = [0u8; FRAME_HEADER_SIZE];
    buf[..4].copy_from_slice(&(payload.len() as u32).to_le_bytes());
    buf[4..].copy_from_slice(&crc32fast::hash(payload).to_le_bytes());
    buf
}

/// The all-zero frame header that terminates a stream.
pub(crate) const SENTINEL: [u8; FRAME_HEADER_SIZE] = [0u8; FRAME_HEADER_SIZE];
