//! Websocket gateway.
//!
//! One task per connection. The socket is split: a writer task drains the
//! user's outbound queue, the connection task itself reads frames and feeds
//! them to the [`UserSession`] one at a time.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::media::MediaEngine;
use crate::registry::Hub;
use crate::session::UserSession;
use crate::signaling::ServerMessage;

/// Binds the configured address and serves until Ctrl-C.
pub async fn run(config: Config, engine: Arc<dyn MediaEngine>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address))?;

    info!(
        target: "sfu.server",
        address = %config.bind_address,
        grace_secs = config.empty_room_grace.as_secs(),
        "Signaling server listening"
    );

    let hub = Hub::new(engine, &config);
    serve_until(listener, hub, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(target: "sfu.server", error = %e, "Failed to listen for Ctrl-C");
        }
    })
    .await;

    info!(target: "sfu.server", "Signaling server stopped");
    Ok(())
}

/// Accepts connections on `listener` until `shutdown` resolves. Connections
/// already accepted keep running.
pub async fn serve_until<F>(listener: TcpListener, hub: Arc<Hub>, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!(target: "sfu.server", "Shutdown requested, no longer accepting connections");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((socket, peer_addr)) => {
                    let hub = Arc::clone(&hub);
                    tokio::spawn(handle_connection(socket, peer_addr, hub));
                }
                Err(e) => {
                    warn!(target: "sfu.server", error = %e, "Failed to accept connection");
                }
            },
        }
    }
}

async fn handle_connection(socket: TcpStream, peer_addr: SocketAddr, hub: Arc<Hub>) {
    let ws_stream = match accept_async(socket).await {
        Ok(ws_stream) => ws_stream,
        Err(e) => {
            warn!(target: "sfu.server", peer = %peer_addr, error = %e, "Websocket handshake failed");
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerMessage>(hub.outbound_capacity);

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    warn!(target: "sfu.server", error = %e, "Failed to encode outbound message");
                    continue;
                }
            };
            if let Err(e) = write.send(Message::Text(json)).await {
                debug!(target: "sfu.server", error = %e, "Websocket write failed");
                break;
            }
        }
        if let Err(e) = write.close().await {
            debug!(target: "sfu.server", error = %e, "Websocket close failed");
        }
    });

    let session = UserSession::open(hub, outbound_tx).await;
    debug!(
        target: "sfu.server",
        peer = %peer_addr,
        user_id = %session.user().id(),
        "Connection established"
    );

    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(text)) => session.handle_text(&text).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(
                    target: "sfu.server",
                    user_id = %session.user().id(),
                    error = %e,
                    "Websocket read failed"
                );
                break;
            }
        }
    }

    session.close().await;
    writer.abort();
    debug!(target: "sfu.server", peer = %peer_addr, "Connection closed");
}
