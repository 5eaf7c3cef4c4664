//! WebSocket server transport.
//!
//! Consumers connect to us. Actions arrive as text (JSON) or binary
//! (MessagePack) frames and are answered in the same mode on the same
//! connection. Events are sent as JSON text to the most recent connection
//! only; with no connection they are skipped.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use axum::{
    Router,
    extract::{
        ConnectInfo, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use onebot_core::{Comm, CommContext, Subscription, TransportError, TransportResult, WsConfig};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::peer::{OUTGOING_CAPACITY, Outgoing, PeerSlot, spawn_action};
use crate::auth;
use crate::task::join_task;

// =============================================================================
// Server
// =============================================================================

struct WsState {
    ctx: CommContext,
    peer: Arc<PeerSlot>,
    shutdown: CancellationToken,
    next_conn_id: AtomicU64,
}

/// A running WebSocket server transport.
pub struct WsComm {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    subscription: Subscription,
    server_task: Mutex<Option<JoinHandle<()>>>,
}

impl WsComm {
    /// Binds the listener, subscribes to the event bus and starts accepting
    /// connections.
    pub async fn create_and_start(config: WsConfig, ctx: CommContext) -> TransportResult<Self> {
        let addr = config.bind_addr();
        info!(addr = %addr, "Starting WebSocket transport");

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| TransportError::BindFailed {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;
        let local_addr = listener.local_addr()?;

        let peer = Arc::new(PeerSlot::default());
        let subscription = ctx.subscribe(peer.clone());
        let shutdown = CancellationToken::new();

        let state = Arc::new(WsState {
            ctx,
            peer,
            shutdown: shutdown.clone(),
            next_conn_id: AtomicU64::new(1),
        });
        let router = Router::new().fallback(ws_handler).with_state(state);

        let token = shutdown.clone();
        let server_task = tokio::spawn(async move {
            let server = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { token.cancelled().await });

            if let Err(e) = server.await {
                error!(addr = %local_addr, error = %e, "WebSocket server error");
            }
        });

        info!(addr = %local_addr, "WebSocket transport started");
        Ok(Self {
            local_addr,
            shutdown,
            subscription,
            server_task: Mutex::new(Some(server_task)),
        })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl Comm for WsComm {
    fn kind(&self) -> &'static str {
        "ws"
    }

    fn endpoint(&self) -> String {
        self.local_addr.to_string()
    }

    async fn stop(&self) {
        if !self.subscription.cancel() {
            return;
        }
        self.shutdown.cancel();

        let task = self.server_task.lock().take();
        if let Some(task) = task {
            join_task(task, "websocket server").await;
        }
        info!(addr = %self.local_addr, "WebSocket transport stopped");
    }
}

// =============================================================================
// Connection handling
// =============================================================================

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WsState>>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if !auth::authorize(state.ctx.access_token(), authorization, uri.query()) {
        warn!(remote_addr = %remote_addr, "Rejected WebSocket connection with invalid access token");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    debug!(remote_addr = %remote_addr, path = %uri.path(), "New WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(state, socket, remote_addr))
        .into_response()
}

async fn handle_socket(state: Arc<WsState>, socket: WebSocket, remote_addr: SocketAddr) {
    let conn_id = state.next_conn_id.fetch_add(1, Ordering::Relaxed);
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Outgoing>(OUTGOING_CAPACITY);

    state.peer.replace(conn_id, tx.clone());
    info!(conn_id, remote_addr = %remote_addr, "WebSocket connection established");

    // ── Send task: forwards queued frames to the socket ──────────────────────
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let msg = match frame {
                Outgoing::Text(text) => Message::Text(text.into()),
                Outgoing::Binary(data) => Message::Binary(data.into()),
                Outgoing::Close => break,
            };
            if ws_tx.send(msg).await.is_err() {
                debug!(conn_id, "WebSocket send failed, connection closed");
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    // ── Receive loop ─────────────────────────────────────────────────────────
    loop {
        let msg = tokio::select! {
            () = state.shutdown.cancelled() => {
                let _ = tx.send(Outgoing::Close).await;
                break;
            }
            msg = ws_rx.next() => msg,
        };

        match msg {
            Some(Ok(Message::Text(text))) => {
                trace!(conn_id, len = text.len(), "Received text frame");
                spawn_action(
                    state.ctx.router().clone(),
                    tx.clone(),
                    text.as_str().as_bytes().to_vec(),
                    false,
                );
            }
            Some(Ok(Message::Binary(data))) => {
                trace!(conn_id, len = data.len(), "Received binary frame");
                spawn_action(state.ctx.router().clone(), tx.clone(), data.to_vec(), true);
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(Message::Close(_))) | None => {
                debug!(conn_id, "WebSocket connection closed by peer");
                break;
            }
            Some(Err(e)) => {
                warn!(conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    state.peer.release(conn_id);
    info!(conn_id, remote_addr = %remote_addr, "WebSocket connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use onebot_core::action::codec;
    use onebot_core::{ActionResult, EventBus, PushedEvent, RawRequest, RawResponse, Request, RetCode};
    use serde_json::{Value, json};
    use std::time::Duration;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as ClientMessage;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;

    async fn get_version(_request: Request<()>) -> ActionResult<Value> {
        Ok(json!({"impl": "test", "version": "0.1.0"}))
    }

    async fn start(token: Option<&str>) -> (WsComm, CommContext) {
        let router = Arc::new(onebot_core::ActionMux::new());
        router.register("get_version", get_version).unwrap();
        let ctx = CommContext::new("test", router, Arc::new(EventBus::new())).with_access_token(token);
        let comm = WsComm::create_and_start(WsConfig::new("127.0.0.1", 0), ctx.clone())
            .await
            .unwrap();
        (comm, ctx)
    }

    fn push(ctx: &CommContext, detail_type: &str) {
        let event = PushedEvent::new("meta.x", &json!({"detail_type": detail_type})).unwrap();
        ctx.bus().broadcast(Arc::new(event));
    }

    async fn next_frame<S>(stream: &mut S) -> ClientMessage
    where
        S: futures::Stream<Item = Result<ClientMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_text_and_binary_actions() {
        let (comm, _ctx) = start(None).await;
        let (mut client, _) = connect_async(format!("ws://{}/", comm.local_addr())).await.unwrap();

        client
            .send(ClientMessage::Text(
                json!({"action": "get_version", "echo": "t"}).to_string().into(),
            ))
            .await
            .unwrap();
        let ClientMessage::Text(text) = next_frame(&mut client).await else {
            panic!("expected a text frame");
        };
        let response: RawResponse = serde_json::from_str(text.as_str()).unwrap();
        assert!(response.is_ok());
        assert_eq!(response.echo, json!("t"));

        let raw = codec::encode(&RawRequest::new("missing", json!({})).with_echo(2), true).unwrap();
        client.send(ClientMessage::Binary(raw.into())).await.unwrap();
        let ClientMessage::Binary(data) = next_frame(&mut client).await else {
            panic!("expected a binary frame");
        };
        let response: RawResponse = codec::decode(&data, true).unwrap();
        assert_eq!(response.retcode, RetCode::UNSUPPORTED_ACTION);
        assert_eq!(response.echo, json!(2));

        comm.stop().await;
    }

    #[tokio::test]
    async fn test_events_go_to_latest_peer() {
        let (comm, ctx) = start(None).await;
        let url = format!("ws://{}/", comm.local_addr());

        // Skipped silently without a peer.
        push(&ctx, "nobody");

        let (mut first, _) = connect_async(url.as_str()).await.unwrap();
        let (mut second, _) = connect_async(url.as_str()).await.unwrap();
        // Give the server a moment to register the second connection.
        tokio::time::sleep(Duration::from_millis(100)).await;

        push(&ctx, "hello");
        let ClientMessage::Text(text) = next_frame(&mut second).await else {
            panic!("expected a text frame");
        };
        let event: Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(event["detail_type"], "hello");

        let nothing = tokio::time::timeout(Duration::from_millis(200), first.next()).await;
        assert!(nothing.is_err());

        comm.stop().await;
    }

    #[tokio::test]
    async fn test_access_token_required() {
        let (comm, _ctx) = start(Some("tok")).await;
        let url = format!("ws://{}/", comm.local_addr());

        assert!(connect_async(url.as_str()).await.is_err());
        assert!(connect_async(format!("{url}?access_token=tok")).await.is_ok());

        let mut request = url.as_str().into_client_request().unwrap();
        request
            .headers_mut()
            .insert("Authorization", "Bearer tok".parse().unwrap());
        assert!(connect_async(request).await.is_ok());

        comm.stop().await;
    }

    #[tokio::test]
    async fn test_stop_unsubscribes_once() {
        let (comm, ctx) = start(None).await;
        assert_eq!(ctx.bus().subscriber_count(), 1);
        comm.stop().await;
        comm.stop().await;
        assert_eq!(ctx.bus().subscriber_count(), 0);
    }
}
