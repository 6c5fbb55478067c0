//! FluxBatch Core - Partitioned Streaming Batch Compression
//!
//! A pipeline stage that groups messages by a partition key, compresses each
//! partition's encoded bytes into its own streaming buffer and emits finished
//! batches once a size or time threshold fires.
//!
//! # Architecture
//!
//! - **Encoder**: pluggable message-to-bytes conversion, resolved by name
//! - **Batcher**: live per-partition compression buffers and flush policy
//! - **Hand-off**: rendezvous channel carrying `(partition, bytes)` records
//! - **Filter**: the demultiplexer and committer tasks and their lifecycle
//! - **Pool / Sink**: host-side message recycling and output injection

pub mod batcher;
pub mod compression;
pub mod encoder;
pub mod filter;
pub mod handoff;
pub mod pool;
pub mod sink;

mod error;
mod types;

pub use error::{BatchError, Result};
pub use filter::{BatchFilter, FilterConfig, RunStats};
pub use pool::{MessagePool, PooledMessage};
pub use types::*;

/// FluxBatch version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod config {
    /// Stage name when none is configured
    pub const DEFAULT_FILTER_NAME: &str = "batch_filter";

    /// Time-triggered flush period (1s)
    pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 1000;

    /// Per-partition size threshold in bytes
    pub const DEFAULT_FLUSH_BYTES: usize = 10;

    /// Routing tag attached to output messages
    pub const DEFAULT_ROUTING_TAG: &str = "compressed";

    /// gzip level
    pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

    /// Output field carrying the routing tag
    pub const ROUTING_TAG_FIELD: &str = "GzipTag";

    /// Output field carrying the partition key
    pub const PARTITION_FIELD: &str = "Partition";
}
