use crate::compression::{CompressionConfig, CompressionWriter};
use crate::handoff::{FlushReason, FlushedBatch};
use crate::{PartitionKey, Result};
use std::time::{Duration, Instant};

/// Compression buffer for a single open partition
pub struct PartitionBuffer {
    writer: CompressionWriter,
    message_count: usize,
    loop_count: u32,
    created_at: Instant,
}

impl PartitionBuffer {
    /// Create an empty buffer
    pub fn new(config: CompressionConfig) -> Self {
        Self {
            writer: CompressionWriter::new(config),
            message_count: 0,
            loop_count: 0,
            created_at: Instant::now(),
        }
    }

    /// Append one encoded message
    pub fn write(&mut self, data: &[u8], loop_count: u32) -> Result<()> {
        self.writer.write(data)?;
        self.message_count += 1;
        self.loop_count = self.loop_count.max(loop_count);
        Ok(())
    }

    /// Check if the buffer has grown past `flush_bytes`
    pub fn should_flush(&self, flush_bytes: usize) -> bool {
        self.writer.uncompressed_len() > flush_bytes
    }

    /// Bytes written so far
    pub fn size(&self) -> usize {
        self.writer.uncompressed_len()
    }

    /// Messages written so far
    pub fn message_count(&self) -> usize {
        self.message_count
    }

    /// Check if nothing is pending
    pub fn is_empty(&self) -> bool {
        self.writer.is_empty()
    }

    /// Get the age since creation
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Seal the compressor and package the result for the committer
    pub fn finish(self, partition: PartitionKey, reason: FlushReason) -> Result<FlushedBatch> {
        let message_count = self.message_count;
        let loop_count = self.loop_count;
        let sealed = self.writer.seal()?;

        Ok(FlushedBatch {
            partition,
            codec: sealed.codec(),
            uncompressed_len: sealed.uncompressed_len(),
            data: sealed.into_data(),
            message_count,
            loop_count,
            reason,
        })
    }
}
