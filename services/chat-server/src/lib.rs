//! Chat server core: framing, connections, and the single-owner hub (§2).
//! Exposed as a library so integration tests can drive a real loopback
//! listener without going through the binary's CLI/env layer.

pub mod acceptor;
pub mod config;
pub mod connection;
pub mod error;
pub mod framing;
pub mod hub;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use config::ServerConfig;
use hub::Hub;

/// Binds `config.bind_addr()` and runs the acceptor + hub until `shutdown`
/// fires. Returns once both have stopped.
pub async fn serve(config: ServerConfig, shutdown: CancellationToken) -> std::io::Result<()> {
    let listener = TcpListener::bind(config.bind_addr()).await?;
    tracing::info!(addr = %config.bind_addr(), "listening");
    run_with_listener(listener, config, shutdown).await;
    Ok(())
}

pub async fn run_with_listener(listener: TcpListener, config: ServerConfig, shutdown: CancellationToken) {
    let (hub, channels) = Hub::new(
        config.register_queue_depth,
        config.register_queue_depth,
        config.inbound_queue_depth,
        shutdown.clone(),
    );
    let hub_task = tokio::spawn(hub.run());
    acceptor::run(listener, &config, channels, shutdown).await;
    let _ = hub_task.await;
}
