//! JSON output formatting

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Wrapper for JSON output with metadata
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonOutput<T> {
    pub data: T,
    pub meta: Metadata,
}

/// Metadata included in JSON output
#[derive(Debug, Serialize, Deserialize)]
pub struct Metadata {
    /// When the output was produced
    pub timestamp: String,

    /// CLI version
    pub version: String,

    /// Whether the data came from the local store instead of the network
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub offline: bool,
}

impl<T> JsonOutput<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            meta: Metadata {
                timestamp: Utc::now().to_rfc3339(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                offline: false,
            },
        }
    }

    pub fn offline(mut self, offline: bool) -> Self {
        self.meta.offline = offline;
        self
    }
}

/// Format data as pretty-printed JSON inside the metadata envelope
pub fn format_json<T: Serialize + ?Sized>(data: &T, offline: bool) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&JsonOutput::new(data).offline(offline))
}
