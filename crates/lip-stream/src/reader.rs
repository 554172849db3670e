use std::fs::File;
use std::io::{self, BufReader, Read};
use std::marker::PhantomData;
use std::path::Path;

use lip_types::codec;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::format::{decode_header, RecordKind, FRAME_HEADER_SIZE, STREAM_HEADER_SIZE};

/// Reads records back from a stream written by [`crate::StreamWriter`].
///
/// Frames are checked in order and never skipped: a CRC mismatch or a
/// missing sentinel is an error, not the end of the stream. Bytes after the
/// sentinel are ignored.
pub struct StreamReader<R: Read> {
    decoder: zstd::stream::read::Decoder<'static, BufReader<R>>,
    kind: RecordKind,
    max_frame_size: u32,
    frames: u64,
    finished: bool,
}

impl StreamReader<File> {
    /// Open the stream file at `path`, requiring records of `kind`.
    pub fn open(path: &Path, kind: RecordKind, config: &StreamConfig) -> Result<Self> {
        Self::new(File::open(path)?, kind, config)
    }
}

impl<R: Read> StreamReader<R> {
    pub fn new(inner: R, expected: RecordKind, config: &StreamConfig) -> Result<Self> {
        let mut decoder = zstd::stream::read::Decoder::new(inner)?;
        let mut header = [0u8; STREAM_HEADER_SIZE];
        read_exact_or(&mut decoder, &mut header, 0)?;
        let kind = decode_header(&header)?;
        if kind != expected {
            return Err(StreamError::KindMismatch {
                expected,
                actual: kind,
            });
        }
        Ok(Self {
            decoder,
            kind,
            max_frame_size: config.max_frame_size,
            frames: 0,
            finished: false,
        })
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// Number of records read so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Read the next record, or `None` once the sentinel is reached.
    pub fn next_record<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        if self.finished {
            return Ok(None);
        }
        let mut header = [0u8; FRAME_HEADER_SIZE];
        read_exact_or(&mut self.decoder, &mut header, self.frames)?;
        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        let frame = self.frames + 1;
        if length == 0 {
            if expected_crc != 0 {
                return Err(StreamError::CrcMismatch {
                    frame,
                    expected: expected_crc,
                    actual: 0,
                });
            }
            self.finished = true;
            debug!(kind = %self.kind, frames = self.frames, "stream sentinel reached");
            return Ok(None);
        }
        if length > self.max_frame_size {
            return Err(StreamError::FrameTooLarge {
                frame,
                length,
                max: self.max_frame_size,
            });
        }

        let mut payload = vec![0u8; length as usize];
        read_exact_or(&mut self.decoder, &mut payload, self.frames)?;
        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != expected_crc {
            return Err(StreamError::CrcMismatch {
                frame,
                expected: expected_crc,
                actual: actual_crc,
            });
        }
        let record =
            codec::decode(&payload).map_err(|e| StreamError::Serialization(e.to_string()))?;
        self.frames = frame;
        Ok(Some(record))
    }

    /// Iterate over the remaining records as values of `T`.
    pub fn records<T: DeserializeOwned>(&mut self) -> Records<'_, R, T> {
        Records {
            reader: self,
            failed: false,
            _marker: PhantomData,
        }
    }

    /// Read every remaining record.
    pub fn read_all<T: DeserializeOwned>(&mut self) -> Result<Vec<T>> {
        self.records().collect()
    }
}

/// Iterator returned by [`StreamReader::records`]. Stops after the first
/// error.
pub struct Records<'a, R: Read, T> {
    reader: &'a mut StreamReader<R>,
    failed: bool,
    _marker: PhantomData<T>,
}

impl<R: Read, T: DeserializeOwned> Iterator for Records<'_, R, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.reader.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// `read_exact`, reporting a short read as a truncated stream.
fn read_exact_or(reader: &mut impl Read, buf: &mut [u8], frames: u64) -> Result<()> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            Err(StreamError::Truncated { frames })
        }
        Err(e) => Err(e.into()),
    }
}
