//! Reverse WebSocket transport: we dial the consumer.
//!
//! A single outbound connection is kept. When it cannot be established or
//! drops, the next attempt is made after the configured reconnect interval.
//! Events raised while disconnected are skipped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use onebot_core::{Comm, CommContext, Subscription, TransportError, TransportResult, WsReverseConfig};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue, header};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::peer::{OUTGOING_CAPACITY, Outgoing, PeerSlot, spawn_action};
use crate::auth;
use crate::task::join_task;
use crate::validate::is_valid_ws_url;

type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A running reverse WebSocket transport.
pub struct WsReverseComm {
    url: String,
    peer: Arc<PeerSlot>,
    shutdown: CancellationToken,
    subscription: Subscription,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WsReverseComm {
    /// Validates the URL, subscribes to the event bus and starts the
    /// connect loop.
    ///
    /// Returns once the loop is running; the first connection attempt
    /// happens in the background.
    pub async fn create_and_start(config: WsReverseConfig, ctx: CommContext) -> TransportResult<Self> {
        info!(url = %config.url, "Starting reverse WebSocket transport");

        if !is_valid_ws_url(&config.url) {
            return Err(TransportError::InvalidConfig(format!(
                "invalid reverse WebSocket URL: {}",
                config.url
            )));
        }
        if config.reconnect_interval == 0 {
            return Err(TransportError::InvalidConfig(
                "reverse WebSocket reconnect_interval must be greater than 0".to_string(),
            ));
        }
        // Surface header problems now rather than on every attempt.
        build_request(&config.url, &ctx)?;

        let peer = Arc::new(PeerSlot::default());
        let subscription = ctx.subscribe(peer.clone());
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(connect_loop(
            config.url.clone(),
            config.reconnect_interval(),
            ctx,
            peer.clone(),
            shutdown.clone(),
        ));

        info!(url = %config.url, "Reverse WebSocket transport started");
        Ok(Self {
            url: config.url,
            peer,
            shutdown,
            subscription,
            task: Mutex::new(Some(task)),
        })
    }

    /// Whether a connection to the consumer is currently open.
    pub fn is_connected(&self) -> bool {
        self.peer.is_connected()
    }
}

#[async_trait]
impl Comm for WsReverseComm {
    fn kind(&self) -> &'static str {
        "ws_reverse"
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }

    async fn stop(&self) {
        if !self.subscription.cancel() {
            return;
        }
        self.shutdown.cancel();

        let task = self.task.lock().take();
        if let Some(task) = task {
            join_task(task, "reverse websocket loop").await;
        }
        info!(url = %self.url, "Reverse WebSocket transport stopped");
    }
}

/// Builds the handshake request with the protocol and bearer headers.
fn build_request(url: &str, ctx: &CommContext) -> TransportResult<Request> {
    let mut request = url.into_client_request().map_err(invalid)?;
    let headers = request.headers_mut();
    for (name, value) in auth::protocol_headers(ctx.platform()) {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(invalid)?;
        let value = HeaderValue::from_str(&value).map_err(invalid)?;
        headers.insert(name, value);
    }
    if let Some(token) = ctx.access_token() {
        let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(invalid)?;
        headers.insert(header::AUTHORIZATION, value);
    }
    Ok(request)
}

fn invalid(e: impl std::fmt::Display) -> TransportError {
    TransportError::InvalidConfig(e.to_string())
}

async fn connect_loop(
    url: String,
    reconnect_interval: Duration,
    ctx: CommContext,
    peer: Arc<PeerSlot>,
    shutdown: CancellationToken,
) {
    let mut conn_id = 0u64;

    loop {
        let request = match build_request(&url, &ctx) {
            Ok(request) => request,
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to build reverse WebSocket request");
                return;
            }
        };

        debug!(url = %url, "Connecting reverse WebSocket");
        let attempt = tokio::select! {
            () = shutdown.cancelled() => break,
            attempt = connect_async(request) => attempt,
        };

        match attempt {
            Ok((stream, _)) => {
                conn_id += 1;
                info!(url = %url, conn_id, "Reverse WebSocket connected");
                serve_connection(stream, conn_id, &ctx, &peer, &shutdown).await;
                info!(url = %url, conn_id, "Reverse WebSocket disconnected");
            }
            Err(e) => {
                let error = TransportError::ConnectionFailed {
                    url: url.clone(),
                    reason: e.to_string(),
                };
                warn!(
                    error = %error,
                    retry_in_ms = reconnect_interval.as_millis() as u64,
                    "Reverse WebSocket connection failed"
                );
            }
        }

        tokio::select! {
            () = shutdown.cancelled() => break,
            () = tokio::time::sleep(reconnect_interval) => {}
        }
    }

    trace!(url = %url, "Reverse WebSocket connect loop finished");
}

async fn serve_connection(
    stream: ClientStream,
    conn_id: u64,
    ctx: &CommContext,
    peer: &PeerSlot,
    shutdown: &CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = stream.split();
    let (tx, mut rx) = mpsc::channel::<Outgoing>(OUTGOING_CAPACITY);
    peer.replace(conn_id, tx.clone());

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let msg = match frame {
                Outgoing::Text(text) => Message::Text(text.into()),
                Outgoing::Binary(data) => Message::Binary(data.into()),
                Outgoing::Close => break,
            };
            if let Err(e) = ws_tx.send(msg).await {
                debug!(conn_id, error = %e, "Reverse WebSocket send failed");
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    loop {
        let msg = tokio::select! {
            () = shutdown.cancelled() => {
                let _ = tx.send(Outgoing::Close).await;
                break;
            }
            msg = ws_rx.next() => msg,
        };

        match msg {
            Some(Ok(Message::Text(text))) => {
                trace!(conn_id, len = text.len(), "Received text frame");
                spawn_action(
                    ctx.router().clone(),
                    tx.clone(),
                    text.as_str().as_bytes().to_vec(),
                    false,
                );
            }
            Some(Ok(Message::Binary(data))) => {
                trace!(conn_id, len = data.len(), "Received binary frame");
                spawn_action(ctx.router().clone(), tx.clone(), data.to_vec(), true);
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => break,
            Some(Err(e)) => {
                warn!(conn_id, error = %e, "Reverse WebSocket error");
                break;
            }
        }
    }

    peer.release(conn_id);
    if shutdown.is_cancelled() {
        let _ = send_task.await;
    }
}

#[cfg(all(test, feature = "ws-server"))]
mod tests {
    use super::*;
    use axum::{
        Router,
        extract::{
            State, WebSocketUpgrade,
            ws::{Message as ServerMessage, WebSocket},
        },
        http::HeaderMap,
        response::Response,
        routing::get,
    };
    use onebot_core::{ActionMux, ActionResult, EventBus, PushedEvent, RawResponse, Request};
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    #[derive(Debug)]
    enum Seen {
        Connected(HeaderMap),
        Frame(String),
    }

    #[derive(Clone)]
    struct Consumer {
        tx: mpsc::UnboundedSender<Seen>,
        hang_up: bool,
    }

    async fn consumer(
        ws: WebSocketUpgrade,
        headers: HeaderMap,
        State(consumer): State<Consumer>,
    ) -> Response {
        let _ = consumer.tx.send(Seen::Connected(headers));
        ws.on_upgrade(move |socket| relay(socket, consumer))
    }

    async fn relay(mut socket: WebSocket, consumer: Consumer) {
        if consumer.hang_up {
            return;
        }
        let request = json!({"action": "get_version", "echo": 1}).to_string();
        if socket.send(ServerMessage::Text(request.into())).await.is_err() {
            return;
        }
        while let Some(Ok(msg)) = socket.recv().await {
            if let ServerMessage::Text(text) = msg {
                let _ = consumer.tx.send(Seen::Frame(text.as_str().to_string()));
            }
        }
    }

    async fn spawn_consumer(hang_up: bool) -> (String, mpsc::UnboundedReceiver<Seen>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .route("/", get(consumer))
            .with_state(Consumer { tx, hang_up });
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("ws://{addr}/"), rx)
    }

    async fn get_version(_request: Request<()>) -> ActionResult<Value> {
        Ok(json!({"impl": "test"}))
    }

    fn context() -> CommContext {
        let router = Arc::new(ActionMux::new());
        router.register("get_version", get_version).unwrap();
        CommContext::new("qq", router, Arc::new(EventBus::new())).with_access_token(Some("tok"))
    }

    async fn next_seen(rx: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_rejects_invalid_url() {
        let ctx = context();
        for url in ["http://contoso.com", "ws://", "test_data"] {
            let result = WsReverseComm::create_and_start(WsReverseConfig::new(url), ctx.clone()).await;
            assert!(matches!(result, Err(TransportError::InvalidConfig(_))), "{url}");
        }
        assert_eq!(ctx.bus().subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_rejects_zero_reconnect_interval() {
        let ctx = context();
        let mut config = WsReverseConfig::new("ws://127.0.0.1:1/");
        config.reconnect_interval = 0;

        let result = WsReverseComm::create_and_start(config, ctx.clone()).await;
        assert!(matches!(result, Err(TransportError::InvalidConfig(_))));
        assert_eq!(ctx.bus().subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_connects_answers_actions_and_pushes_events() {
        let (url, mut seen) = spawn_consumer(false).await;
        let ctx = context();
        let comm = WsReverseComm::create_and_start(WsReverseConfig::new(&url), ctx.clone())
            .await
            .unwrap();

        let Seen::Connected(headers) = next_seen(&mut seen).await else {
            panic!("expected a handshake");
        };
        assert_eq!(headers["authorization"], "Bearer tok");
        assert_eq!(headers["x-onebot-version"], "12");
        assert_eq!(headers["x-impl"], "qq");

        let Seen::Frame(text) = next_seen(&mut seen).await else {
            panic!("expected an action response");
        };
        let response: RawResponse = serde_json::from_str(&text).unwrap();
        assert!(response.is_ok());
        assert_eq!(response.echo, json!(1));
        assert!(comm.is_connected());

        let event = PushedEvent::new("meta.x", &json!({"detail_type": "x"})).unwrap();
        ctx.bus().broadcast(Arc::new(event));
        let Seen::Frame(text) = next_seen(&mut seen).await else {
            panic!("expected an event");
        };
        let event: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(event["detail_type"], "x");

        comm.stop().await;
        comm.stop().await;
        assert_eq!(ctx.bus().subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_reconnects_after_disconnect() {
        let (url, mut seen) = spawn_consumer(true).await;
        let config = WsReverseConfig::new(&url).with_reconnect_interval(50);
        let comm = WsReverseComm::create_and_start(config, context()).await.unwrap();

        assert!(matches!(next_seen(&mut seen).await, Seen::Connected(_)));
        assert!(matches!(next_seen(&mut seen).await, Seen::Connected(_)));

        comm.stop().await;
    }
}
