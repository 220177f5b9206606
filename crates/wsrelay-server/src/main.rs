//! wsrelay server binary.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: WebSocket on 127.0.0.1:8080/ws/<username>, stats on 127.0.0.1:8081
//! wsrelay-server
//!
//! # Public bind with a custom prefix
//! wsrelay-server --ws-bind 0.0.0.0:9000 --http-bind 0.0.0.0:9001 --prefix /chat
//! ```

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use wsrelay_core::RelayConfig;
use wsrelay_server::{Server, ServerRuntimeConfig};

/// WebSocket message relay
#[derive(Parser, Debug)]
#[command(name = "wsrelay-server")]
#[command(about = "WebSocket message relay with per-user sessions")]
#[command(version)]
struct Args {
    /// WebSocket listener address
    #[arg(long, default_value = "127.0.0.1:8080")]
    ws_bind: String,

    /// Stats HTTP listener address
    #[arg(long, default_value = "127.0.0.1:8081")]
    http_bind: String,

    /// Upgrade path prefix; clients connect to <prefix>/<username>
    #[arg(long, default_value = "/ws")]
    prefix: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("wsrelay server starting");

    let config = ServerRuntimeConfig {
        ws_bind: args.ws_bind,
        http_bind: args.http_bind,
        driver: RelayConfig {
            prefix: args.prefix,
            max_connections: args.max_connections,
            ..RelayConfig::default()
        },
    };

    let server = Server::bind(config).await?;

    tracing::info!("Relay listening on {}", server.local_addr()?);
    tracing::info!("Stats listening on {}", server.stats_addr()?);

    server.run().await?;

    Ok(())
}
