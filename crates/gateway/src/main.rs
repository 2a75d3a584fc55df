use std::net::SocketAddr;

use tracing::info;

use slicemock_common::Seed;
use slicemock_gateway::{Gateway, GatewayConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let addr: SocketAddr = std::env::var("SLICEMOCK_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8787".to_string())
        .parse()?;

    let config = GatewayConfig::from_env();

    // SLICEMOCK_SEED points at a YAML fixture; otherwise the storefront defaults
    let seed = match std::env::var("SLICEMOCK_SEED").ok().filter(|v| !v.trim().is_empty()) {
        Some(path) => Seed::from_file(std::path::Path::new(&path))?,
        None => Seed::storefront(),
    };

    info!(
        "Starting mock gateway on http://{} (origin {}, unmatched {:?})",
        addr, config.base_url, config.unmatched
    );

    let gateway = Gateway::storefront(config, seed)?;
    slicemock_gateway::server::serve(addr, gateway).await
}
