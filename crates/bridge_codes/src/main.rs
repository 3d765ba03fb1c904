//! # bridge_memory_worker
//!
//! Serves one bundled code over NATS with an in-memory kernel in place of
//! the native worker. Sessions connect to it exactly as they would to the
//! real binary, which makes it useful for exercising controller scripts
//! without the scientific code installed.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bridge_worker::{WorkerConfig, WorkerRunner};

#[derive(Parser)]
#[command(name = "bridge_memory_worker", about = "In-memory stand-in for a bundled worker code")]
struct Args {
    /// Code to serve: evtwin, huayno or athena.
    code: String,

    /// Worker name to answer as. Defaults to the code's worker binary.
    #[arg(short, long)]
    worker: Option<String>,

    /// NATS server URL. Defaults to `NATS_URL`, then `nats://localhost:4222`.
    #[arg(short, long)]
    nats_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("bridge_memory_worker=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let definition = bridge_codes::definition(&args.code)?;
    let kernel = bridge_codes::memory_kernel(&args.code)?;

    let mut config = WorkerConfig::new(args.worker.unwrap_or(definition.worker));
    if let Some(url) = args.nats_url {
        config = config.with_nats_url(url);
    }
    info!(code = %args.code, worker = %config.name, "serving in-memory worker");

    WorkerRunner::new(config)
        .run(Arc::clone(&definition.functions), kernel)
        .await?;

    info!("worker stopped");
    Ok(())
}
