//! Identity server over stdio and a rendezvous socket.
//!
//! Prints the 64-byte rendezvous on stdout, then echoes every channel back
//! batch by batch. Sizing comes from `BATCHPIPE_BATCH_SIZE`,
//! `BATCHPIPE_WORK_SIZE` and `BATCHPIPE_PATH_PREFIX`; logs go to stderr.

use std::process::ExitCode;

use anyhow::Context;
use batchpipe::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn run() -> anyhow::Result<()> {
    let config = BrokerConfig::from_env()
        .map_err(BatchpipeError::from)
        .context("reading configuration")?;
    tracing::debug!(?config, "starting echo server");

    let report = serve_stdio(config, || Ok::<_, ProcessorError>(IdentityProcessor)).map_err(BatchpipeError::from)?;

    match &report.primary {
        Ok(primary) => tracing::info!(
            primary = %primary.to_json(),
            bytes_per_sec = primary.throughput_bytes_per_sec(),
            admitted = report.admitted,
            rejected = report.rejected,
            client_bytes = report.clients.bytes_written,
            "echo server finished"
        ),
        Err(e) => tracing::warn!(error = %e, "primary channel never ran"),
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let fatal = e.downcast_ref::<BatchpipeError>().is_some_and(BatchpipeError::is_fatal);
            if fatal {
                tracing::error!("fatal: {e:#}");
            } else {
                tracing::error!("{e:#}");
            }
            ExitCode::FAILURE
        }
    }
}
