//! Partitioned batch filter
//!
//! Two tasks run side by side for the lifetime of the input stream:
//!
//! - **Demultiplexer**: encodes each input message, routes its bytes to the
//!   partition named by the configured field and decides when a partition
//!   flushes (size threshold, periodic tick, end of input).
//! - **Committer**: turns each flushed batch into an output message tagged
//!   with the routing tag and partition, then injects it into the sink.
//!
//! They are connected by the rendezvous [`handoff`](crate::handoff) channel.

mod committer;
mod demux;

pub use committer::Committer;
pub use demux::Demultiplexer;

use crate::compression::{Codec, CompressionConfig};
use crate::encoder::{Encoder, EncoderRegistry};
use crate::sink::OutputSink;
use crate::{handoff, BatchError, MessagePool, PooledMessage, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Filter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Stage name, used to qualify the encoder and as output logger
    pub name: String,
    /// Time-triggered flush period in milliseconds
    pub flush_interval: u64,
    /// Per-partition size above which a batch is cut
    pub flush_bytes: usize,
    /// Constant tag attached to every output message
    pub routing_tag: String,
    /// Encoder name to resolve at start-up
    pub encoder: String,
    /// Message field supplying the partition key
    pub partition_field: String,
    /// Streaming codec
    pub codec: Codec,
    /// gzip level (0-9)
    pub compression_level: u32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            name: crate::config::DEFAULT_FILTER_NAME.to_string(),
            flush_interval: crate::config::DEFAULT_FLUSH_INTERVAL_MS,
            flush_bytes: crate::config::DEFAULT_FLUSH_BYTES,
            routing_tag: crate::config::DEFAULT_ROUTING_TAG.to_string(),
            encoder: String::new(),
            partition_field: String::new(),
            codec: Codec::default(),
            compression_level: crate::config::DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl FilterConfig {
    /// Parse a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| BatchError::Config(e.to_string()))
    }

    /// Load a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Reject configurations the filter cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(BatchError::Config("a name value must be specified".into()));
        }
        if self.routing_tag.is_empty() {
            return Err(BatchError::Config(
                "a routing_tag value must be specified".into(),
            ));
        }
        if self.partition_field.is_empty() {
            return Err(BatchError::Config(
                "a partition_field value must be specified".into(),
            ));
        }
        if self.encoder.is_empty() {
            return Err(BatchError::Config("an encoder must be specified".into()));
        }
        if self.flush_interval == 0 {
            return Err(BatchError::Config(
                "flush_interval must be greater than zero".into(),
            ));
        }
        if self.compression_level > 9 {
            return Err(BatchError::Config(format!(
                "compression_level {} is out of range 0-9",
                self.compression_level
            )));
        }
        Ok(())
    }

    /// Flush tick period
    pub fn flush_period(&self) -> Duration {
        Duration::from_millis(self.flush_interval)
    }

    /// Compression settings for partition buffers
    pub fn compression(&self) -> CompressionConfig {
        CompressionConfig {
            codec: self.codec,
            level: self.compression_level,
        }
    }
}

/// Counters collected over one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub messages_received: u64,
    pub encode_errors: u64,
    pub empty_encodings: u64,
    pub partition_errors: u64,
    pub size_flushes: u64,
    pub timer_flushes: u64,
    pub shutdown_flushes: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub batches_committed: u64,
}

impl RunStats {
    /// Batches handed to the committer, whatever the trigger
    pub fn batches_flushed(&self) -> u64 {
        self.size_flushes + self.timer_flushes + self.shutdown_flushes
    }
}

/// A configured filter ready to run
pub struct BatchFilter {
    config: FilterConfig,
    encoder: Box<dyn Encoder>,
}

impl BatchFilter {
    /// Validate `config` and resolve its encoder
    pub fn new(config: FilterConfig, registry: &EncoderRegistry) -> Result<Self> {
        config.validate()?;
        let encoder = registry.resolve(&config.name, &config.encoder)?;
        Ok(Self { config, encoder })
    }

    /// Filter configuration
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Consume `input` until it closes, committing batches into `sink`.
    ///
    /// Output messages are drawn from `pool`. The run fails if the pool runs
    /// dry; per-message problems are logged and skipped.
    pub async fn run<S: OutputSink>(
        self,
        input: mpsc::Receiver<PooledMessage>,
        pool: MessagePool,
        sink: S,
    ) -> Result<RunStats> {
        let BatchFilter { config, encoder } = self;
        info!(
            "Starting filter {} (partition field {}, flush every {}ms or above {} bytes, {})",
            config.name,
            config.partition_field,
            config.flush_interval,
            config.flush_bytes,
            config.codec
        );

        let (tx, rx) = handoff::channel();
        let demux = Demultiplexer::new(&config, encoder);
        let committer = Committer::new(&config, pool, sink);

        let demux_task = tokio::spawn(demux.run(input, tx));
        let commit_task = tokio::spawn(committer.run(rx));
        let (demux_result, commit_result) = tokio::join!(demux_task, commit_task);

        let committed = commit_result
            .map_err(|e| BatchError::Internal(format!("committer task failed: {}", e)))?
            .map_err(|e| {
                error!("Filter {} committer stopped: {}", config.name, e);
                e
            })?;
        let mut stats = demux_result
            .map_err(|e| BatchError::Internal(format!("demultiplexer task failed: {}", e)))??;
        stats.batches_committed = committed;

        info!(
            "Filter {} finished: {} messages in, {} batches out ({} -> {} bytes)",
            config.name,
            stats.messages_received,
            stats.batches_committed,
            stats.bytes_in,
            stats.bytes_out
        );

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::decompress;
    use crate::config::{PARTITION_FIELD, ROUTING_TAG_FIELD};
    use crate::sink::ChannelSink;
    use crate::Message;
    use parking_lot::Mutex;
    use rand::{Rng, SeedableRng};
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;
    use tokio::task::JoinHandle;

    fn config(flush_bytes: usize, flush_interval: u64) -> FilterConfig {
        FilterConfig {
            encoder: "payload".to_string(),
            partition_field: "tenant".to_string(),
            flush_bytes,
            flush_interval,
            ..Default::default()
        }
    }

    fn message(pool: &MessagePool, tenant: &str, payload: &str) -> PooledMessage {
        pool.acquire_with(Message::new(payload.to_string()).with_field("tenant", tenant))
            .unwrap()
    }

    fn start(
        config: FilterConfig,
        registry: &EncoderRegistry,
        pool: &MessagePool,
    ) -> (
        mpsc::Sender<PooledMessage>,
        mpsc::Receiver<PooledMessage>,
        JoinHandle<Result<RunStats>>,
    ) {
        let filter = BatchFilter::new(config, registry).unwrap();
        let (input_tx, input_rx) = mpsc::channel(16);
        let (sink, output) = ChannelSink::new(1024);
        let handle = tokio::spawn(filter.run(input_rx, pool.clone(), sink));
        (input_tx, output, handle)
    }

    fn field<'a>(message: &'a PooledMessage, name: &str) -> &'a str {
        message.find_first_field(name).and_then(|v| v.as_str()).unwrap()
    }

    #[test]
    fn test_config_defaults_from_json() {
        let config =
            FilterConfig::from_json(r#"{"encoder": "json", "partition_field": "host"}"#).unwrap();

        assert_eq!(config.flush_interval, 1000);
        assert_eq!(config.flush_bytes, 10);
        assert_eq!(config.routing_tag, "compressed");
        assert_eq!(config.codec, Codec::Gzip);
        config.validate().unwrap();

        let lz4 = FilterConfig::from_json(
            r#"{"encoder": "json", "partition_field": "host", "codec": "lz4"}"#,
        )
        .unwrap();
        assert_eq!(lz4.codec, Codec::Lz4);
    }

    #[test]
    fn test_config_validation() {
        let valid = config(10, 1000);
        valid.validate().unwrap();

        let cases = [
            FilterConfig {
                encoder: String::new(),
                ..valid.clone()
            },
            FilterConfig {
                partition_field: String::new(),
                ..valid.clone()
            },
            FilterConfig {
                routing_tag: String::new(),
                ..valid.clone()
            },
            FilterConfig {
                flush_interval: 0,
                ..valid.clone()
            },
            FilterConfig {
                compression_level: 12,
                ..valid.clone()
            },
        ];

        for case in cases {
            assert!(matches!(case.validate(), Err(BatchError::Config(_))));
        }

        assert!(FilterConfig::from_json("{not json").is_err());
    }

    #[test]
    fn test_unknown_encoder_fails_start() {
        let mut cfg = config(10, 1000);
        cfg.encoder = "avro".to_string();

        match BatchFilter::new(cfg, &EncoderRegistry::with_builtins()) {
            Err(BatchError::EncoderNotFound(name)) => assert_eq!(name, "batch_filter-avro"),
            _ => panic!("expected EncoderNotFound"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_flush_commits_both_messages() {
        let pool = MessagePool::new(64, 4);
        let registry = EncoderRegistry::with_builtins();
        let (input, mut output, handle) = start(config(10, 60_000), &registry, &pool);

        input.send(message(&pool, "A", "aaaaa")).await.unwrap();
        input.send(message(&pool, "A", "bbbbb")).await.unwrap();

        let committed = output.recv().await.unwrap();
        assert_eq!(field(&committed, ROUTING_TAG_FIELD), "compressed");
        assert_eq!(field(&committed, "GzipTag"), "compressed");
        assert_eq!(field(&committed, PARTITION_FIELD), "A");
        assert_eq!(committed.logger, "batch_filter");
        assert!(!committed.uuid.is_nil());
        assert_eq!(
            decompress(Codec::Gzip, &committed.payload).unwrap(),
            b"aaaaa\nbbbbb\n"
        );
        drop(committed);

        drop(input);
        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.messages_received, 2);
        assert_eq!(stats.size_flushes, 1);
        assert_eq!(stats.timer_flushes, 0);
        assert_eq!(stats.shutdown_flushes, 0);
        assert_eq!(stats.batches_committed, 1);
        assert!(output.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_flush_closes_partition() {
        let pool = MessagePool::new(64, 4);
        let registry = EncoderRegistry::with_builtins();
        let (input, mut output, handle) = start(config(1024, 100), &registry, &pool);

        input.send(message(&pool, "B", "lonely")).await.unwrap();

        let committed = output.recv().await.unwrap();
        assert_eq!(field(&committed, PARTITION_FIELD), "B");
        assert_eq!(decompress(Codec::Gzip, &committed.payload).unwrap(), b"lonely\n");
        drop(committed);

        // Further ticks find nothing pending
        tokio::time::sleep(Duration::from_millis(350)).await;
        drop(input);

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.timer_flushes, 1);
        assert_eq!(stats.shutdown_flushes, 0);
        assert_eq!(stats.batches_committed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_only_pending_partitions() {
        let pool = MessagePool::new(64, 4);
        let registry = EncoderRegistry::with_builtins();
        let (input, mut output, handle) = start(config(10, 60_000), &registry, &pool);

        input.send(message(&pool, "A", "abc")).await.unwrap();
        // B crosses the threshold at once and is left open but empty
        input.send(message(&pool, "B", "0123456789")).await.unwrap();
        drop(input);

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.size_flushes, 1);
        assert_eq!(stats.shutdown_flushes, 1);

        let mut partitions = Vec::new();
        while let Some(committed) = output.recv().await {
            let partition = field(&committed, PARTITION_FIELD).to_string();
            if partition == "A" {
                assert_eq!(decompress(Codec::Gzip, &committed.payload).unwrap(), b"abc\n");
            }
            partitions.push(partition);
        }
        assert_eq!(partitions, vec!["B", "A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_messages_are_skipped_and_recycled() {
        struct Picky;

        impl Encoder for Picky {
            fn encode(&self, message: &Message) -> Result<Vec<u8>> {
                if &message.payload[..] == b"bad" {
                    return Err(BatchError::Encode("refusing bad payload".into()));
                }
                Ok(message.payload.to_vec())
            }
        }

        let mut registry = EncoderRegistry::new();
        registry.register("picky", || Box::new(Picky));
        let mut cfg = config(1024, 60_000);
        cfg.encoder = "picky".to_string();

        let pool = MessagePool::new(64, 4);
        let (input, mut output, handle) = start(cfg, &registry, &pool);

        input.send(message(&pool, "A", "good")).await.unwrap();
        input.send(message(&pool, "A", "bad")).await.unwrap();
        input.send(message(&pool, "A", "")).await.unwrap();
        input
            .send(pool.acquire_with(Message::new("no tenant")).unwrap())
            .await
            .unwrap();
        input.send(message(&pool, "A", "-also-good")).await.unwrap();
        drop(input);

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.messages_received, 5);
        assert_eq!(stats.encode_errors, 1);
        assert_eq!(stats.empty_encodings, 1);
        assert_eq!(stats.partition_errors, 1);
        assert_eq!(stats.shutdown_flushes, 1);

        let committed = output.recv().await.unwrap();
        assert_eq!(
            decompress(Codec::Gzip, &committed.payload).unwrap(),
            b"good-also-good"
        );
        drop(committed);
        assert!(output.recv().await.is_none());

        // every input and output message went back exactly once
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.recycled(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_sink_stops_input() {
        /// Keeps every output message and never finishes an inject
        #[derive(Clone, Default)]
        struct StalledSink {
            held: Arc<Mutex<Vec<PooledMessage>>>,
        }

        impl OutputSink for StalledSink {
            fn inject(
                &self,
                message: PooledMessage,
            ) -> impl std::future::Future<Output = Result<()>> + Send {
                self.held.lock().push(message);
                std::future::pending()
            }
        }

        let pool = MessagePool::new(64, 4);
        let filter =
            BatchFilter::new(config(2, 60_000), &EncoderRegistry::with_builtins()).unwrap();
        let sink = StalledSink::default();
        let (input, input_rx) = mpsc::channel(16);
        let handle = tokio::spawn(filter.run(input_rx, pool.clone(), sink.clone()));

        // Every message crosses the threshold on its own
        for payload in ["m0", "m1", "m2", "m3"] {
            input.send(message(&pool, "A", payload)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        // m0's batch is stuck in the sink and m1's flush waits on the committer
        assert_eq!(pool.recycled(), 2);
        assert_eq!(sink.held.lock().len(), 1);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_exhaustion_stops_run() {
        // Inputs arrive at loop count 1, so outputs would need loop count 2
        let pool = MessagePool::new(64, 1);
        let registry = EncoderRegistry::with_builtins();
        let (input, _output, handle) = start(config(4, 60_000), &registry, &pool);

        input.send(message(&pool, "A", "overflow")).await.unwrap();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(BatchError::PoolExhausted(_))));
        assert!(input.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_partition_order_and_identity() {
        let pool = MessagePool::new(1024, 4);
        let registry = EncoderRegistry::with_builtins();
        let mut cfg = config(64, 5);
        cfg.codec = Codec::Lz4;
        let (input, mut output, handle) = start(cfg, &registry, &pool);

        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let tenants = ["red", "green", "blue", "amber"];
        let mut expected: HashMap<String, Vec<u8>> = HashMap::new();

        for i in 0..400 {
            let tenant = tenants[rng.gen_range(0..tenants.len())];
            let payload = format!("{}:{}:{}", tenant, i, "x".repeat(rng.gen_range(1..20)));
            expected
                .entry(tenant.to_string())
                .or_default()
                .extend_from_slice(format!("{}\n", payload).as_bytes());
            input.send(message(&pool, tenant, &payload)).await.unwrap();

            if i % 25 == 0 {
                tokio::time::sleep(Duration::from_millis(7)).await;
            }
        }
        drop(input);

        let stats = handle.await.unwrap().unwrap();
        assert!(stats.size_flushes > 0);
        assert!(stats.timer_flushes > 0);
        assert_eq!(stats.batches_committed, stats.batches_flushed());

        let mut seen_ids = HashSet::new();
        let mut actual: HashMap<String, Vec<u8>> = HashMap::new();
        while let Some(committed) = output.recv().await {
            assert_eq!(committed.fields.len(), 2);
            assert_eq!(field(&committed, ROUTING_TAG_FIELD), "compressed");
            assert!(seen_ids.insert(committed.uuid));

            let plain = decompress(Codec::Lz4, &committed.payload).unwrap();
            assert!(!plain.is_empty());
            actual
                .entry(field(&committed, PARTITION_FIELD).to_string())
                .or_default()
                .extend_from_slice(&plain);
        }

        assert_eq!(seen_ids.len() as u64, stats.batches_committed);
        assert_eq!(actual, expected);
    }
}
