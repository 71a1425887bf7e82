//! Breaker gateway
//!
//! ```text
//!     Client ──▶ server ──▶ dispatcher ──▶ breaker gate ──▶ forwarder ──▶ Backend
//!                   │                          │
//!                   │                          └── recovery timer (OPEN → HALF_OPEN)
//!                   └── /health, /breaker-status
//! ```

use std::path::PathBuf;

use clap::Parser;

use breaker_gateway::config::loader::resolve_config;
use breaker_gateway::lifecycle::startup;
use breaker_gateway::observability::logging;

#[derive(Parser, Debug)]
#[command(name = "breaker-gateway", about = "HTTP gateway with per-route circuit breakers")]
struct Args {
    /// TOML configuration file; built-in routes are used when absent
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Listener address, overrides the config file
    #[arg(short, long, env = "HTTP_ADDR")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = resolve_config(args.config.as_deref(), args.bind)?;
    logging::init(&config.observability.log_level);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "breaker-gateway starting");

    startup::run(config).await?;
    Ok(())
}
