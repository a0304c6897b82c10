//! RustPac - Main entry point
//!
//! Serves PAC files generated from the host and rule tables

use anyhow::Result;
use clap::Parser;
use rustpac::{DatabaseManager, PacServer, ServerConfig};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// RustPac - A proxy auto-config server
#[derive(Parser, Debug)]
#[command(name = "rustpac")]
#[command(author = "RustPac Contributors")]
#[command(version = "1.0.0")]
#[command(about = "Serve proxy auto-config files from a host and rule database")]
struct Args {
    /// HTTP port to listen on
    #[arg(long, env = "HTTP_PORT", default_value = "8080")]
    http_port: u16,

    /// Address to bind to
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0")]
    bind_addr: IpAddr,

    /// Database path
    #[arg(long, env = "DB_PATH", default_value = "./data/pac.db")]
    db_path: PathBuf,

    /// Bearer token required by the management API
    #[arg(long, env = "API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG takes precedence over --log-level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(&args.log_level)));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("Starting RustPac v{}", env!("CARGO_PKG_VERSION"));

    let db_manager = Arc::new(DatabaseManager::new(&args.db_path)?);
    info!("Database initialized at: {}", args.db_path.display());

    let config = ServerConfig {
        bind_addr: args.bind_addr,
        http_port: args.http_port,
        api_token: args.api_token.filter(|t| !t.is_empty()),
    };

    let server = Arc::new(PacServer::new(config, db_manager));
    server.run().await?;

    Ok(())
}

/// Map a simple level name to a filter directive, keeping hyper quiet
fn filter_directive(level: &str) -> String {
    let level = match level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };

    format!("{},hyper=warn", level)
}
