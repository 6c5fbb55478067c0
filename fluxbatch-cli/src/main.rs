//! FluxBatch - runs the batch stage over JSON lines read from stdin
//!
//! Usage: `fluxbatch <config.json> [out_dir]`

mod host;

use anyhow::Context;
use fluxbatch_core::encoder::EncoderRegistry;
use fluxbatch_core::sink::ChannelSink;
use fluxbatch_core::{BatchFilter, FilterConfig, MessagePool};
use std::path::PathBuf;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Messages the host pool hands out at once
const POOL_CAPACITY: usize = 1024;

/// Times a message may be re-injected before it is refused
const MAX_MSG_LOOPS: u32 = 4;

/// Input messages queued ahead of the stage
const INPUT_BUFFER: usize = 128;

/// Output batches queued ahead of the file writer
const OUTPUT_BUFFER: usize = 16;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = args
        .next()
        .context("usage: fluxbatch <config.json> [out_dir]")?;
    let out_dir = PathBuf::from(args.next().unwrap_or_else(|| "batches".to_string()));

    let config = FilterConfig::from_file(&config_path)
        .with_context(|| format!("failed to load {}", config_path))?;
    let codec = config.codec;
    let filter = BatchFilter::new(config, &EncoderRegistry::with_builtins())?;

    info!("Starting FluxBatch {}...", fluxbatch_core::VERSION);
    info!("Output directory: {:?}", out_dir);

    let pool = MessagePool::new(POOL_CAPACITY, MAX_MSG_LOOPS);
    let (input_tx, input_rx) = mpsc::channel(INPUT_BUFFER);
    let (sink, output_rx) = ChannelSink::new(OUTPUT_BUFFER);

    // Ctrl-C stops reading; the stage then drains as if stdin had closed
    let ct = CancellationToken::new();
    tokio::spawn({
        let ct = ct.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, draining open partitions");
                ct.cancel();
            }
        }
    });

    let reader = tokio::spawn(host::read_input(
        BufReader::new(tokio::io::stdin()),
        pool.clone(),
        input_tx,
        ct,
    ));
    let writer = tokio::spawn(host::write_outputs(output_rx, out_dir, codec));

    let stats = filter.run(input_rx, pool, sink).await?;
    let forwarded = reader.await??;
    let written = writer.await??;

    info!(
        "Done: {} lines forwarded, {} messages batched, {} dropped, {} batches written",
        forwarded,
        stats.messages_received,
        stats.encode_errors + stats.partition_errors,
        written
    );

    Ok(())
}
