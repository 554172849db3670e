use serde::{Deserialize, Serialize};

/// Settings for [`crate::CaptiveSource`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptiveConfig {
    /// Ledgers the background task may read ahead of the consumer.
    pub buffer_size: usize,
    /// Recompute and check every ledger header hash, not just the links.
    pub verify_headers: bool,
}

impl Default for CaptiveConfig {
    fn default() -> Self {
        Self {
            buffer_size: 64,
            verify_headers: false,
        }
    }
}
