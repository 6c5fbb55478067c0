//! Decompression of sealed batches

use super::Codec;
use crate::{BatchError, Result};
use flate2::read::GzDecoder;
use lz4_flex::frame::FrameDecoder;
use std::io::Read;

/// Decompress one batch produced by a [`CompressionWriter`](super::CompressionWriter)
pub fn decompress(codec: Codec, data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() * 4);
    match codec {
        Codec::Gzip => {
            GzDecoder::new(data)
                .read_to_end(&mut out)
                .map_err(|e| BatchError::Compression(e.to_string()))?;
        }
        Codec::Lz4 => {
            FrameDecoder::new(data)
                .read_to_end(&mut out)
                .map_err(|e| BatchError::Compression(e.to_string()))?;
        }
    }
    Ok(out)
}
