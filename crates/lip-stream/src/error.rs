use std::io;

use crate::format::RecordKind;

/// Errors produced while writing or reading a record stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("not a record stream: bad magic {0:?}")]
    BadMagic([u8; 4]),

    #[error("unsupported stream format version {0}")]
    UnsupportedVersion(u32),

    #[error("unknown record kind byte {0:#04x}")]
    UnknownKind(u8),

    #[error("stream holds {actual} records, expected {expected}")]
    KindMismatch {
        expected: RecordKind,
        actual: RecordKind,
    },

    /// The stream ended before its end-of-stream sentinel.
    #[error("stream truncated after {frames} frames")]
    Truncated { frames: u64 },

    #[error("CRC mismatch in frame {frame}: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch { frame: u64, expected: u32, actual: u32 },

    #[error("frame {frame} length {length} exceeds limit {max}")]
    FrameTooLarge { frame: u64, length: u32, max: u32 },

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias used throughout the stream crate.
pub type Result<T> = std::result::Result<T, StreamError>;
