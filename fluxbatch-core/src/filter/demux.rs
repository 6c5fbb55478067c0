//! Ingress demultiplexer task

use super::{FilterConfig, RunStats};
use crate::batcher::PartitionBatcher;
use crate::encoder::Encoder;
use crate::handoff::{FlushReason, FlushSender, FlushedBatch};
use crate::{BatchError, PartitionKey, PooledMessage, Result};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Routes encoded messages into partition buffers and emits flushed batches
pub struct Demultiplexer {
    encoder: Box<dyn Encoder>,
    partition_field: String,
    flush_period: Duration,
    batcher: PartitionBatcher,
    stats: RunStats,
}

impl Demultiplexer {
    /// Create a demultiplexer using `encoder`
    pub fn new(config: &FilterConfig, encoder: Box<dyn Encoder>) -> Self {
        Self {
            encoder,
            partition_field: config.partition_field.clone(),
            flush_period: config.flush_period(),
            batcher: PartitionBatcher::new(config.compression(), config.flush_bytes),
            stats: RunStats::default(),
        }
    }

    /// Run until `input` closes, then flush what is left and close the
    /// hand-off by dropping `tx`.
    pub async fn run(
        mut self,
        mut input: mpsc::Receiver<PooledMessage>,
        tx: FlushSender,
    ) -> Result<RunStats> {
        let mut ticker = interval_at(Instant::now() + self.flush_period, self.flush_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                received = input.recv() => {
                    let Some(message) = received else {
                        break;
                    };
                    self.ingest(message, &tx).await?;
                }
                _ = ticker.tick() => {
                    for batch in self.batcher.expire()? {
                        self.emit(batch, &tx).await?;
                    }
                }
                _ = tx.closed() => {
                    warn!("Committer stopped, abandoning {} open partitions", self.batcher.len());
                    return Err(BatchError::HandoffClosed);
                }
            }
        }

        info!("Input closed, draining {} open partitions", self.batcher.len());
        for batch in self.batcher.drain()? {
            self.emit(batch, &tx).await?;
        }

        Ok(self.stats)
    }

    async fn ingest(&mut self, message: PooledMessage, tx: &FlushSender) -> Result<()> {
        self.stats.messages_received += 1;
        let buffered = self.buffer_message(&message);
        message.recycle();

        match buffered {
            Ok(Some(batch)) => self.emit(batch, tx).await,
            Ok(None) => Ok(()),
            Err(e) if e.is_per_message() => {
                if let BatchError::MissingPartitionField(_) = e {
                    self.stats.partition_errors += 1;
                    warn!("Dropping message: {}", e);
                } else {
                    self.stats.encode_errors += 1;
                    error!("{}", e);
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn buffer_message(&mut self, message: &PooledMessage) -> Result<Option<FlushedBatch>> {
        let encoded = self.encoder.encode(message).map_err(|e| match e {
            BatchError::Encode(_) => e,
            other => BatchError::Encode(other.to_string()),
        })?;

        if encoded.is_empty() {
            self.stats.empty_encodings += 1;
            return Ok(None);
        }

        let partition = message
            .find_first_field(&self.partition_field)
            .map(|value| PartitionKey::new(value.to_string()))
            .ok_or_else(|| BatchError::MissingPartitionField(self.partition_field.clone()))?;

        self.stats.bytes_in += encoded.len() as u64;
        self.batcher.write(&partition, &encoded, message.loop_count())
    }

    async fn emit(&mut self, batch: FlushedBatch, tx: &FlushSender) -> Result<()> {
        match batch.reason {
            FlushReason::Size => self.stats.size_flushes += 1,
            FlushReason::Timer => self.stats.timer_flushes += 1,
            FlushReason::Shutdown => self.stats.shutdown_flushes += 1,
        }
        self.stats.bytes_out += batch.data.len() as u64;

        debug!(
            "Flushing partition {} ({}): {} messages, {} -> {} bytes",
            batch.partition,
            batch.reason,
            batch.message_count,
            batch.uncompressed_len,
            batch.data.len()
        );

        tx.send(batch).await
    }
}
