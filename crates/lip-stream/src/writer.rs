use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use lip_types::codec;
use serde::Serialize;
use tracing::debug;

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::format::{encode_frame_header, encode_header, RecordKind, SENTINEL};

/// Writes records of one kind as a framed, compressed stream.
///
/// The stream is only valid once [`StreamWriter::finish`] has written the
/// end-of-stream sentinel; a writer dropped early leaves a stream that
/// readers report as truncated.
pub struct StreamWriter<W: Write> {
    encoder: zstd::stream::write::Encoder<'static, W>,
    kind: RecordKind,
    frames: u64,
}

impl StreamWriter<BufWriter<File>> {
    /// Create (or overwrite) a stream file at `path`.
    pub fn create(path: &Path, kind: RecordKind, config: &StreamConfig) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), kind, config)
    }
}

impl<W: Write> StreamWriter<W> {
    pub fn new(inner: W, kind: RecordKind, config: &StreamConfig) -> Result<Self> {
        let mut encoder = zstd::stream::write::Encoder::new(inner, config.compression_level)?;
        encoder.write_all(&encode_header(kind))?;
        Ok(Self {
            encoder,
            kind,
            frames: 0,
        })
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// Number of records appended so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Append one record as a frame.
    pub fn append<T: Serialize>(&mut self, record: &T) -> Result<()> {
        let payload =
            codec::encode(record).map_err(|e| StreamError::Serialization(e.to_string()))?;
        if payload.is_empty() {
            // An empty payload would be indistinguishable from the sentinel.
            return Err(StreamError::Serialization("empty record payload".into()));
        }
        self.encoder.write_all(&encode_frame_header(&payload))?;
        self.encoder.write_all(&payload)?;
        self.frames += 1;
        debug!(frame = self.frames, len = payload.len(), "stream frame written");
        Ok(())
    }

    pub fn append_all<'a, T: Serialize + 'a>(
        &mut self,
        records: impl IntoIterator<Item = &'a T>,
    ) -> Result<()> {
        for record in records {
            self.append(record)?;
        }
        Ok(())
    }

    /// Write the sentinel, flush the compressor, and return the inner writer.
    pub fn finish(mut self) -> Result<W> {
        self.encoder.write_all(&SENTINEL)?;
        let mut inner = self.encoder.finish()?;
        inner.flush()?;
        debug!(kind = %self.kind, frames = self.frames, "stream finished");
        Ok(inner)
    }
}
