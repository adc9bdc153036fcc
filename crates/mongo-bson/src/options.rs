//! Codec configuration.

use serde::{Deserialize, Serialize};

/// Largest message accepted by the server wire protocol: 4 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Scratch buffer used for string decoding.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 128;

/// Options shared by [`BsonReader`](crate::BsonReader) and
/// [`BsonWriter`](crate::BsonWriter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CodecOptions {
    /// Upper bound on the encoded size of a top-level document.
    pub max_message_size: usize,
    /// Size of the string-decoding scratch buffer.
    pub read_buffer_size: usize,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl CodecOptions {
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    pub fn with_read_buffer_size(mut self, read_buffer_size: usize) -> Self {
        self.read_buffer_size = read_buffer_size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = CodecOptions::default();
        assert_eq!(options.max_message_size, 4_194_304);
        assert_eq!(options.read_buffer_size, 128);
    }

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let options: CodecOptions = serde_json::from_str(r#"{"maxMessageSize": 1024}"#).unwrap();
        assert_eq!(options.max_message_size, 1024);
        assert_eq!(options.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
    }
}
