use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use forum_server::ServerConfig;
use forum_store::Database;
use forum_telemetry::{init_telemetry, LogFormat, TelemetryConfig};
use tracing::Level;

/// Forum web server with a real-time chat relay.
#[derive(Debug, Parser)]
#[command(name = "forum", version)]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Address to bind.
    #[arg(long = "bind", default_value = "0.0.0.0")]
    bind_addr: IpAddr,

    /// SQLite database file. Created on first run.
    #[arg(long, default_value = "forum.db")]
    db: PathBuf,

    /// Directory of static frontend files.
    #[arg(long, default_value = "frontend")]
    static_dir: PathBuf,

    /// Per-peer outbound chat queue capacity.
    #[arg(long = "send-queue", default_value_t = 256)]
    send_queue: usize,

    /// Default log level; RUST_LOG takes precedence.
    #[arg(long, default_value = "info")]
    log_level: Level,

    /// `json` or `pretty`.
    #[arg(long, default_value = "json")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_telemetry(&TelemetryConfig {
        log_level: args.log_level,
        module_levels: Vec::new(),
        format: args.log_format,
    })?;

    tracing::info!("starting forum server");

    let db = Database::open(&args.db)
        .with_context(|| format!("failed to open database at {}", args.db.display()))?;
    tracing::info!(path = %db.path().display(), "database opened");

    let config = ServerConfig {
        bind_addr: args.bind_addr,
        port: args.port,
        send_queue_capacity: args.send_queue.max(1),
        static_dir: args.static_dir,
    };
    let handle = forum_server::start(config, db)
        .await
        .context("failed to start server")?;

    tracing::info!(port = handle.port(), "forum server ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}
