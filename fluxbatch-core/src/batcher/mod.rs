//! Per-partition batching
//!
//! [`PartitionBatcher`] holds the live set of partition buffers and makes the
//! flush decisions. It is owned by the demultiplexer task alone, so it needs
//! no locking.
//!
//! The two timed paths treat partitions differently on purpose:
//! - a size flush swaps in a fresh buffer and the partition stays open;
//! - a tick (or shutdown) removes the partition entirely, so idle partitions
//!   do not keep compressor state around. The next message recreates it.

mod partition;

pub use partition::PartitionBuffer;

use crate::compression::CompressionConfig;
use crate::handoff::{FlushReason, FlushedBatch};
use crate::{PartitionKey, Result};
use std::collections::HashMap;
use tracing::debug;

/// Live partition buffers and their flush policy
pub struct PartitionBatcher {
    partitions: HashMap<PartitionKey, PartitionBuffer>,
    compression: CompressionConfig,
    flush_bytes: usize,
}

impl PartitionBatcher {
    /// Create a batcher with no open partitions
    pub fn new(compression: CompressionConfig, flush_bytes: usize) -> Self {
        Self {
            partitions: HashMap::new(),
            compression,
            flush_bytes,
        }
    }

    /// Append encoded bytes to `partition`, returning a batch if the partition
    /// crossed the size threshold.
    pub fn write(
        &mut self,
        partition: &PartitionKey,
        data: &[u8],
        loop_count: u32,
    ) -> Result<Option<FlushedBatch>> {
        let compression = self.compression;
        let buffer = self
            .partitions
            .entry(partition.clone())
            .or_insert_with(|| PartitionBuffer::new(compression));

        buffer.write(data, loop_count)?;

        if !buffer.should_flush(self.flush_bytes) {
            return Ok(None);
        }

        let full = std::mem::replace(buffer, PartitionBuffer::new(compression));
        debug!(
            "Partition {} reached {} bytes in {} messages",
            partition,
            full.size(),
            full.message_count()
        );

        full.finish(partition.clone(), FlushReason::Size).map(Some)
    }

    /// Seal every pending partition on a flush tick and close them all
    pub fn expire(&mut self) -> Result<Vec<FlushedBatch>> {
        self.take_all(FlushReason::Timer)
    }

    /// Seal every pending partition when the input ends
    pub fn drain(&mut self) -> Result<Vec<FlushedBatch>> {
        self.take_all(FlushReason::Shutdown)
    }

    fn take_all(&mut self, reason: FlushReason) -> Result<Vec<FlushedBatch>> {
        let mut batches = Vec::new();

        for (partition, buffer) in self.partitions.drain() {
            if buffer.is_empty() {
                continue;
            }
            debug!(
                "Partition {} flushing on {} after {:?}",
                partition,
                reason,
                buffer.age()
            );
            batches.push(buffer.finish(partition, reason)?);
        }

        Ok(batches)
    }

    /// Check whether `partition` has a live buffer
    pub fn is_open(&self, partition: &PartitionKey) -> bool {
        self.partitions.contains_key(partition)
    }

    /// Uncompressed bytes pending for `partition`
    pub fn pending_bytes(&self, partition: &PartitionKey) -> Option<usize> {
        self.partitions.get(partition).map(|b| b.size())
    }

    /// Number of open partitions
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    /// Check if no partition is open
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}
