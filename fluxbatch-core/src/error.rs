//! Error types for FluxBatch

use thiserror::Error;

/// Result type alias for FluxBatch operations
pub type Result<T> = std::result::Result<T, BatchError>;

/// FluxBatch error types
#[derive(Error, Debug)]
pub enum BatchError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No encoder registered under the requested name
    #[error("Encoder not found: {0}")]
    EncoderNotFound(String),

    /// A single message could not be encoded
    #[error("Error encoding message: {0}")]
    Encode(String),

    /// The partition field is absent from a message
    #[error("Message has no partition field '{0}'")]
    MissingPartitionField(String),

    /// Compression/decompression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// The host pool has no output unit to hand out
    #[error("Output pool exhausted: {0}")]
    PoolExhausted(String),

    /// The other end of the flush hand-off went away
    #[error("Flush hand-off closed")]
    HandoffClosed,

    /// The output sink rejected a unit
    #[error("Sink error: {0}")]
    Sink(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BatchError {
    /// Errors that only cost the current message; the stream keeps going.
    pub fn is_per_message(&self) -> bool {
        matches!(
            self,
            BatchError::Encode(_) | BatchError::MissingPartitionField(_)
        )
    }
}
