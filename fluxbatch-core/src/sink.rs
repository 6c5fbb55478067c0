//! Output sink for committed batches

use crate::{BatchError, PooledMessage, Result};
use std::future::Future;
use tokio::sync::mpsc;

/// Accepts fully populated output messages for downstream injection
pub trait OutputSink: Send + Sync + 'static {
    /// Inject one message. May wait while downstream is busy.
    fn inject(&self, message: PooledMessage) -> impl Future<Output = Result<()>> + Send;
}

/// Sink that forwards output messages over a channel to the host
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<PooledMessage>,
}

impl ChannelSink {
    /// Create a sink and the receiver the host reads from
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<PooledMessage>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }
}

impl OutputSink for ChannelSink {
    fn inject(&self, message: PooledMessage) -> impl Future<Output = Result<()>> + Send {
        let tx = self.tx.clone();
        async move {
            tx.send(message)
                .await
                .map_err(|_| BatchError::Sink("output receiver dropped".to_string()))
        }
    }
}
