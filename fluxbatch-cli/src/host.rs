//! Host side of the stage: JSON-lines input and file output

use anyhow::Context;
use fluxbatch_core::compression::Codec;
use fluxbatch_core::config::PARTITION_FIELD;
use fluxbatch_core::{now_nanos, FieldValue, Fields, Message, MessagePool, PooledMessage};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long to wait for the pool to free a message before retrying
const POOL_RETRY_DELAY: Duration = Duration::from_millis(5);

// ============================================================================
// Input
// ============================================================================

/// One input line
#[derive(Debug, Deserialize)]
pub struct InputRecord {
    #[serde(default)]
    pub payload: String,
    #[serde(default, rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub logger: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub severity: i32,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl InputRecord {
    /// Parse a single JSON line
    pub fn parse(line: &str) -> anyhow::Result<Self> {
        serde_json::from_str(line).context("invalid input record")
    }

    /// Build the pipeline message for this record
    pub fn into_message(self) -> Message {
        let mut fields = Fields::new();
        for (name, value) in self.fields {
            fields.insert(name, field_value(value));
        }

        Message {
            timestamp: self.timestamp.unwrap_or_else(now_nanos),
            msg_type: self.msg_type,
            logger: self.logger,
            hostname: self.hostname,
            severity: self.severity,
            fields,
            ..Message::new(self.payload)
        }
    }
}

fn field_value(value: serde_json::Value) -> FieldValue {
    match value {
        serde_json::Value::String(s) => FieldValue::String(s),
        serde_json::Value::Bool(b) => FieldValue::Boolean(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => FieldValue::Integer(i),
            None => FieldValue::Float(n.as_f64().unwrap_or_default()),
        },
        other => FieldValue::String(other.to_string()),
    }
}

/// Feed JSON-lines from `reader` into the stage until EOF or cancellation.
///
/// Returns the number of messages forwarded. Dropping `tx` on return closes
/// the stage's input, which starts its drain.
pub async fn read_input<R>(
    reader: R,
    pool: MessagePool,
    tx: mpsc::Sender<PooledMessage>,
    ct: CancellationToken,
) -> anyhow::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0u64;

    loop {
        let line = tokio::select! {
            _ = ct.cancelled() => break,
            line = lines.next_line() => line.context("failed to read input")?,
        };
        let Some(line) = line else {
            break;
        };

        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let record = match InputRecord::parse(line) {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping input line: {:#}", e);
                continue;
            }
        };

        let Some(mut pooled) = acquire(&pool, &ct).await else {
            break;
        };
        pooled.set_message(record.into_message());

        if tx.send(pooled).await.is_err() {
            warn!("Stage stopped accepting input");
            break;
        }
        forwarded += 1;
    }

    info!("Input finished after {} messages", forwarded);
    Ok(forwarded)
}

async fn acquire(pool: &MessagePool, ct: &CancellationToken) -> Option<PooledMessage> {
    loop {
        if let Some(pooled) = pool.acquire(0) {
            return Some(pooled);
        }
        tokio::select! {
            _ = ct.cancelled() => return None,
            _ = tokio::time::sleep(POOL_RETRY_DELAY) => {}
        }
    }
}

// ============================================================================
// Output
// ============================================================================

/// Write every committed batch under `out_dir` until the stage closes its sink
pub async fn write_outputs(
    mut rx: mpsc::Receiver<PooledMessage>,
    out_dir: PathBuf,
    codec: Codec,
) -> anyhow::Result<u64> {
    tokio::fs::create_dir_all(&out_dir)
        .await
        .with_context(|| format!("failed to create {:?}", out_dir))?;

    let mut written = 0u64;
    while let Some(message) = rx.recv().await {
        let path = output_path(&out_dir, &message, codec);
        tokio::fs::write(&path, &message.payload)
            .await
            .with_context(|| format!("failed to write {:?}", path))?;

        info!("Wrote {} bytes to {:?}", message.payload.len(), path);
        message.recycle();
        written += 1;
    }

    debug!("Output finished after {} batches", written);
    Ok(written)
}

/// `<out_dir>/<partition>-<uuid>.<ext>`
pub fn output_path(out_dir: &Path, message: &Message, codec: Codec) -> PathBuf {
    let partition = message
        .find_first_field(PARTITION_FIELD)
        .map(|v| v.to_string())
        .unwrap_or_default();

    out_dir.join(format!(
        "{}.{}",
        file_stem(&partition, &message.uuid.to_string()),
        codec.extension()
    ))
}

/// Partition keys are arbitrary strings; keep file names portable
fn file_stem(partition: &str, uuid: &str) -> String {
    let safe: String = partition
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if safe.is_empty() {
        uuid.to_string()
    } else {
        format!("{}-{}", safe, uuid)
    }
}
