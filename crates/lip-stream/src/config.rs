use serde::{Deserialize, Serialize};

/// Settings for writing and reading record streams.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// zstd compression level used by writers (1-22).
    pub compression_level: i32,
    /// Largest payload a reader accepts in one frame, in bytes.
    pub max_frame_size: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            compression_level: 3,
            max_frame_size: 64 * 1024 * 1024, // 64 MiB
        }
    }
}
