//! Streaming compression for partition buffers
//!
//! A buffer goes through two phases. A [`CompressionWriter`] accepts bytes and
//! feeds them through a streaming compressor into an in-memory sink. Calling
//! [`CompressionWriter::seal`] finalizes the compressor (emitting any trailer
//! bytes) and yields a [`SealedBuffer`], the only type that exposes the
//! compressed bytes.

mod decoder;
mod encoder;

pub use decoder::decompress;
pub use encoder::{CompressionWriter, SealedBuffer};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Streaming codec used for partition buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// gzip member (RFC 1952)
    #[default]
    Gzip,
    /// LZ4 frame format
    Lz4,
}

impl Codec {
    /// File extension conventionally used for this codec
    pub fn extension(&self) -> &'static str {
        match self {
            Codec::Gzip => "gz",
            Codec::Lz4 => "lz4",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Codec::Gzip => f.write_str("gzip"),
            Codec::Lz4 => f.write_str("lz4"),
        }
    }
}

/// Compression configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionConfig {
    /// Codec for every partition buffer
    pub codec: Codec,
    /// gzip level (0-9); ignored by lz4
    pub level: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            codec: Codec::Gzip,
            level: crate::config::DEFAULT_COMPRESSION_LEVEL,
        }
    }
}
