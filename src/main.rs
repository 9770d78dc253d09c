use agent_worker::{EngineConfig, StaticAgentFactory, start_with_channel};
use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Runs the dispatch engine over stdio: one JSON command per input line,
/// one JSON result per output line.
#[derive(Parser)]
#[command(name = "agent-worker")]
#[command(about = "Stdio host for the agent command-dispatch engine")]
struct Cli {
    /// Number of concurrent workers
    #[arg(long, default_value_t = 2)]
    workers: usize,

    /// Inbound queue capacity
    #[arg(long, default_value_t = 256)]
    queue_capacity: usize,

    /// Milliseconds a command may wait for a queue slot
    #[arg(long, default_value_t = 30_000)]
    enqueue_timeout_ms: u64,

    /// Commands that may wait for a queue slot at once
    #[arg(long, default_value_t = 1024)]
    max_deferred: usize,

    /// Do not emit the startup notification
    #[arg(long)]
    test_mode: bool,

    /// Install the `test` namespace (echo, throwError, timeout)
    #[arg(long)]
    self_test: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = EngineConfig::new()
        .worker_count(cli.workers)
        .queue_capacity(cli.queue_capacity)
        .enqueue_timeout(Duration::from_millis(cli.enqueue_timeout_ms))
        .max_deferred(cli.max_deferred)
        .test_mode(cli.test_mode)
        .self_test_handlers(cli.self_test);

    let (engine, mut results) = start_with_channel(config, Arc::new(StaticAgentFactory::default()))
        .context("failed to start dispatch engine")?;
    let bridge = engine.bridge();

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(message) = results.recv().await {
            stdout.write_all(message.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        bridge.handle_message(&line);
    }

    tracing::info!(stats = %engine.stats(), "stdin closed, shutting down");
    engine.shutdown().await.context("engine shutdown")?;
    drop(bridge);

    writer
        .await
        .context("stdout writer panicked")?
        .context("failed to write results")?;
    Ok(())
}
