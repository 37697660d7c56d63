use std::env;

use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{signal as unix_signal, SignalKind};
use tokio_util::sync::CancellationToken;

use chat_server::config::ServerConfig;

/// Chat hub server. No CLI parsing — every protocol parameter is
/// env-configured (§4.7), matching `services/server/src/main.rs` and
/// `services/forwarder/src/main.rs`, neither of which takes CLI flags.
#[tokio::main]
async fn main() {
    let log_level = env::var("CHAT_SERVER_LOG").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::new(log_level)).init();

    let config = ServerConfig::from_env();

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("shutdown signal received");
        shutdown_signal.cancel();
    });

    chat_server::serve(config, shutdown).await.expect("failed to bind listener");
}

/// Mirrors the teacher's `shutdown_signal` helper: ctrl-c everywhere,
/// plus SIGTERM on unix.
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        unix_signal(SignalKind::terminate()).expect("failed to install SIGTERM handler").recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
