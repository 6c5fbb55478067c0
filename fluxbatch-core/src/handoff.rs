//! Flush hand-off between the demultiplexer and the committer
//!
//! Each flush travels as one [`FlushedBatch`] carrying both the partition key
//! and the sealed bytes, so a key can never be separated from its batch. A
//! send completes only once the committer has taken the batch, so at most one
//! flush is ever in flight between the two tasks.

use crate::compression::Codec;
use crate::{BatchError, PartitionKey, Result};
use bytes::Bytes;
use std::fmt;
use tokio::sync::mpsc;

/// What caused a partition to flush
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlushReason {
    /// Buffered bytes exceeded the size threshold
    Size,
    /// The periodic flush tick fired
    Timer,
    /// The input stream closed
    Shutdown,
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushReason::Size => f.write_str("size"),
            FlushReason::Timer => f.write_str("timer"),
            FlushReason::Shutdown => f.write_str("shutdown"),
        }
    }
}

/// A sealed partition batch in transit to the committer
#[derive(Debug, Clone)]
pub struct FlushedBatch {
    /// Source partition
    pub partition: PartitionKey,
    /// Compressed bytes
    pub data: Bytes,
    /// Codec used for `data`
    pub codec: Codec,
    /// Messages folded into this batch
    pub message_count: usize,
    /// Bytes before compression
    pub uncompressed_len: usize,
    /// Highest loop count among the batched messages
    pub loop_count: u32,
    /// Flush trigger
    pub reason: FlushReason,
}

/// Create a connected hand-off pair
pub fn channel() -> (FlushSender, FlushReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (FlushSender { tx }, FlushReceiver { rx })
}

/// Demultiplexer side of the hand-off
pub struct FlushSender {
    tx: mpsc::Sender<FlushedBatch>,
}

impl FlushSender {
    /// Send a batch and wait until the committer has received it
    pub async fn send(&self, batch: FlushedBatch) -> Result<()> {
        self.tx
            .send(batch)
            .await
            .map_err(|_| BatchError::HandoffClosed)?;

        // The slot frees up only when the committer takes the batch out
        let permit = self
            .tx
            .reserve()
            .await
            .map_err(|_| BatchError::HandoffClosed)?;
        drop(permit);
        Ok(())
    }

    /// Resolves once the committer has stopped receiving
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    /// Check whether the committer has stopped receiving
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Committer side of the hand-off
pub struct FlushReceiver {
    rx: mpsc::Receiver<FlushedBatch>,
}

impl FlushReceiver {
    /// Next batch, or `None` once the sender is gone and the channel is empty
    pub async fn recv(&mut self) -> Option<FlushedBatch> {
        self.rx.recv().await
    }
}
