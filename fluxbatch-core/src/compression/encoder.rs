//! Write-then-seal compression buffer

use super::{Codec, CompressionConfig};
use crate::{BatchError, Result};
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use lz4_flex::frame::FrameEncoder;
use std::io::Write;

const INITIAL_BUFFER_CAPACITY: usize = 4096;

enum Inner {
    Gzip(GzEncoder<Vec<u8>>),
    Lz4(FrameEncoder<Vec<u8>>),
}

/// Accepts uncompressed bytes for one partition.
///
/// The compressed output is unreachable until [`seal`](Self::seal) is called,
/// since streaming compressors hold data internally until finalized.
pub struct CompressionWriter {
    inner: Inner,
    codec: Codec,
    uncompressed_len: usize,
}

impl CompressionWriter {
    /// Create an empty writer
    pub fn new(config: CompressionConfig) -> Self {
        let sink = Vec::with_capacity(INITIAL_BUFFER_CAPACITY);
        let inner = match config.codec {
            Codec::Gzip => Inner::Gzip(GzEncoder::new(sink, Compression::new(config.level.min(9)))),
            Codec::Lz4 => Inner::Lz4(FrameEncoder::new(sink)),
        };

        Self {
            inner,
            codec: config.codec,
            uncompressed_len: 0,
        }
    }

    /// Feed bytes through the compressor
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.inner {
            Inner::Gzip(enc) => enc.write_all(data)?,
            Inner::Lz4(enc) => enc.write_all(data)?,
        }
        self.uncompressed_len += data.len();
        Ok(())
    }

    /// Number of uncompressed bytes written so far
    pub fn uncompressed_len(&self) -> usize {
        self.uncompressed_len
    }

    /// Check if nothing has been written
    pub fn is_empty(&self) -> bool {
        self.uncompressed_len == 0
    }

    /// Codec in use
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Finalize the compressor and hand over the compressed bytes
    pub fn seal(self) -> Result<SealedBuffer> {
        let data = match self.inner {
            Inner::Gzip(enc) => enc.finish()?,
            Inner::Lz4(enc) => enc
                .finish()
                .map_err(|e| BatchError::Compression(e.to_string()))?,
        };

        Ok(SealedBuffer {
            data: Bytes::from(data),
            codec: self.codec,
            uncompressed_len: self.uncompressed_len,
        })
    }
}

/// A finalized, immutable compressed buffer
#[derive(Debug, Clone)]
pub struct SealedBuffer {
    data: Bytes,
    codec: Codec,
    uncompressed_len: usize,
}

impl SealedBuffer {
    /// The compressed bytes
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Take ownership of the compressed bytes
    pub fn into_data(self) -> Bytes {
        self.data
    }

    /// Codec the bytes were produced with
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Size before compression
    pub fn uncompressed_len(&self) -> usize {
        self.uncompressed_len
    }
}
