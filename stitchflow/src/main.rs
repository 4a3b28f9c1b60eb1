use anyhow::Context;
use std::sync::Arc;
use stitchflow::events::LoggingEventSink;
use stitchflow::prelude::*;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = StitchConfig::from_env().context("invalid configuration")?;
    init_tracing(&config.log).context("failed to install tracing subscriber")?;

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("failed to create {}", config.upload_dir.display()))?;
    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .with_context(|| format!("failed to create {}", config.output_dir.display()))?;

    info!(
        variant = ?config.variant,
        program = %config.program,
        upload_dir = %config.upload_dir.display(),
        output_dir = %config.output_dir.display(),
        isolate_requests = config.isolate_requests,
        "starting stitchflow"
    );

    let addr = config.socket_addr();
    let pipeline =
        StitchPipeline::new(config).with_event_sink(Arc::new(LoggingEventSink::debug()));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    stitchflow::server::serve(listener, build_router(pipeline))
        .await
        .context("server error")
}
