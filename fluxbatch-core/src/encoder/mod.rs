//! Pluggable message encoders
//!
//! An encoder turns one message into the raw bytes that get appended to a
//! partition buffer. Encoders are looked up by name in an
//! [`EncoderRegistry`] when a stage starts.

mod binary;
mod json;
mod payload;

pub use binary::BincodeEncoder;
pub use json::JsonEncoder;
pub use payload::PayloadEncoder;

use crate::{BatchError, Message, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Turns a message into bytes
pub trait Encoder: Send + Sync {
    /// Encode a single message. An empty result means there is nothing to
    /// batch for this message.
    fn encode(&self, message: &Message) -> Result<Vec<u8>>;
}

type EncoderFactory = Arc<dyn Fn() -> Box<dyn Encoder> + Send + Sync>;

/// Named encoder factories
#[derive(Clone, Default)]
pub struct EncoderRegistry {
    factories: HashMap<String, EncoderFactory>,
}

impl EncoderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in encoders
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(PayloadEncoder::NAME, || Box::new(PayloadEncoder::default()));
        registry.register(JsonEncoder::NAME, || Box::new(JsonEncoder));
        registry.register(BincodeEncoder::NAME, || Box::new(BincodeEncoder));
        registry
    }

    /// Register an encoder factory under `name`, replacing any previous one
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Encoder> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Build a fresh encoder instance for the stage named `owner`.
    ///
    /// The instance is reported as `<owner>-<name>`.
    pub fn resolve(&self, owner: &str, name: &str) -> Result<Box<dyn Encoder>> {
        let full_name = format!("{}-{}", owner, name);
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| BatchError::EncoderNotFound(full_name.clone()))?;

        debug!("Resolved encoder {}", full_name);
        Ok(factory())
    }

    /// Names of all registered encoders
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    impl Encoder for Upper {
        fn encode(&self, message: &Message) -> Result<Vec<u8>> {
            Ok(message.payload.to_ascii_uppercase())
        }
    }

    #[test]
    fn test_builtins_registered() {
        let registry = EncoderRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["bincode", "json", "payload"]);
    }

    #[test]
    fn test_resolve_custom() {
        let mut registry = EncoderRegistry::new();
        registry.register("upper", || Box::new(Upper));

        let encoder = registry.resolve("batcher", "upper").unwrap();
        let bytes = encoder.encode(&Message::new("abc")).unwrap();
        assert_eq!(bytes, b"ABC");
    }

    #[test]
    fn test_resolve_missing() {
        let registry = EncoderRegistry::with_builtins();
        match registry.resolve("batcher", "protobuf") {
            Err(BatchError::EncoderNotFound(name)) => assert_eq!(name, "batcher-protobuf"),
            _ => panic!("expected EncoderNotFound"),
        }
    }
}
