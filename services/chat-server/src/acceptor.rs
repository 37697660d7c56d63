//! Accept loop: turns incoming sockets into connections (§2, §5).

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::connection::{self, ConnectionConfig};
use crate::hub::HubChannels;

pub async fn run(listener: TcpListener, config: &ServerConfig, channels: HubChannels, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                tracing::info!("acceptor stopping");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        tracing::info!(%peer, "accepted connection");
                        // CHAT_SERVER_IDLE_TIMEOUT_SECS folds into the per-read
                        // deadline: re-arming it before every read (§4.3) already
                        // disconnects a client that has gone quiet.
                        let read_timeout = match (config.read_timeout, config.idle_timeout) {
                            (Some(r), Some(i)) => Some(r.min(i)),
                            (Some(r), None) => Some(r),
                            (None, Some(i)) => Some(i),
                            (None, None) => None,
                        };
                        let conn_config = ConnectionConfig {
                            max_frame_bytes: config.max_frame_bytes,
                            write_queue_depth: config.write_queue_depth,
                            read_timeout,
                            write_timeout: config.write_timeout,
                        };
                        tokio::spawn(connection::run(
                            stream,
                            shutdown.clone(),
                            conn_config,
                            channels.register_tx.clone(),
                            channels.unregister_tx.clone(),
                            channels.inbound_tx.clone(),
                        ));
                    }
                    Err(err) => {
                        tracing::warn!(%err, "accept failed");
                    }
                }
            }
        }
    }
}
