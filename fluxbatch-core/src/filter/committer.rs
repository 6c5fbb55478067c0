//! Batch committer task

use super::FilterConfig;
use crate::config::{PARTITION_FIELD, ROUTING_TAG_FIELD};
use crate::handoff::{FlushReceiver, FlushedBatch};
use crate::sink::OutputSink;
use crate::{now_nanos, BatchError, FieldValue, MessagePool, PooledMessage, Result};
use tracing::{debug, info};
use uuid::Uuid;

/// Wraps flushed batches into output messages and injects them
pub struct Committer<S> {
    name: String,
    routing_tag: String,
    pool: MessagePool,
    sink: S,
}

impl<S: OutputSink> Committer<S> {
    /// Create a committer drawing output messages from `pool`
    pub fn new(config: &FilterConfig, pool: MessagePool, sink: S) -> Self {
        Self {
            name: config.name.clone(),
            routing_tag: config.routing_tag.clone(),
            pool,
            sink,
        }
    }

    /// Commit batches until the hand-off is closed and drained.
    ///
    /// Returns the number of batches committed. Stops at the first batch that
    /// cannot get an output message from the pool.
    pub async fn run(self, mut rx: FlushReceiver) -> Result<u64> {
        let mut committed = 0u64;

        while let Some(batch) = rx.recv().await {
            let message = self.build_message(batch)?;
            self.sink.inject(message).await?;
            committed += 1;
        }

        info!("Committer for {} done after {} batches", self.name, committed);
        Ok(committed)
    }

    fn build_message(&self, batch: FlushedBatch) -> Result<PooledMessage> {
        let mut message = self.pool.acquire(batch.loop_count).ok_or_else(|| {
            BatchError::PoolExhausted(format!(
                "no output message for partition {} (loop count {}, max {}, {} of {} in use)",
                batch.partition,
                batch.loop_count,
                self.pool.max_loops(),
                self.pool.outstanding(),
                self.pool.capacity()
            ))
        })?;

        let uuid = Uuid::new_v4();
        debug!("Committing batch {} for partition {}", uuid, batch.partition);

        message.uuid = uuid;
        message.timestamp = now_nanos();
        message.logger = self.name.clone();
        message
            .fields
            .insert(ROUTING_TAG_FIELD, FieldValue::from(self.routing_tag.as_str()));
        message
            .fields
            .insert(PARTITION_FIELD, FieldValue::String(batch.partition.to_string()));
        message.payload = batch.data;

        Ok(message)
    }
}
