//! HTTP transport: actions over `POST`, events buffered for polling.
//!
//! ```text
//! GET  /        → liveness text
//! POST /        → action (application/json or application/msgpack)
//! POST / get_latest_events → drains the event buffer
//! other methods → 405
//! ```

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use onebot_core::action::codec;
use onebot_core::names::GET_LATEST_EVENTS;
use onebot_core::{
    ActionError, Comm, CommContext, EventSubscriber, HttpConfig, PushedEvent, RawRequest,
    RawResponse, Subscription, TransportError, TransportResult,
};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::auth;
use crate::task::join_task;
use crate::frame;

const CONTENT_TYPE_JSON: &str = "application/json";
const CONTENT_TYPE_MSGPACK: &str = "application/msgpack";

/// Events kept for polling before the oldest are discarded.
const MAX_BUFFERED_EVENTS: usize = 4096;

// =============================================================================
// Event buffer
// =============================================================================

/// FIFO of events waiting for `get_latest_events`.
struct EventBuffer {
    events: Mutex<VecDeque<Arc<PushedEvent>>>,
    notify: Notify,
}

impl EventBuffer {
    fn new() -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Removes up to `limit` events (0 = all), oldest first.
    fn drain(&self, limit: usize) -> Vec<Value> {
        let mut events = self.events.lock();
        let take = if limit == 0 {
            events.len()
        } else {
            limit.min(events.len())
        };
        events.drain(..take).map(|e| e.value().clone()).collect()
    }

    /// Drains the buffer, waiting up to `timeout` for the first event when it
    /// is empty.
    async fn poll(&self, limit: usize, timeout: Duration, shutdown: &CancellationToken) -> Vec<Value> {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let events = self.drain(limit);
        if !events.is_empty() || timeout.is_zero() {
            return events;
        }

        tokio::select! {
            _ = tokio::time::timeout(timeout, notified) => {}
            () = shutdown.cancelled() => {}
        }
        self.drain(limit)
    }
}

impl EventSubscriber for EventBuffer {
    fn on_event(&self, event: &Arc<PushedEvent>) {
        {
            let mut events = self.events.lock();
            if events.len() >= MAX_BUFFERED_EVENTS {
                events.pop_front();
                warn!(event = %event.name(), "HTTP event buffer full, dropping oldest event");
            }
            events.push_back(Arc::clone(event));
        }
        self.notify.notify_waiters();
    }
}

/// Parameters of `get_latest_events`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GetLatestEvents {
    /// Maximum number of events; 0 returns everything.
    limit: usize,
    /// Seconds to wait for an event when none is buffered.
    timeout: u64,
}

// =============================================================================
// Server
// =============================================================================

struct HttpState {
    ctx: CommContext,
    buffer: Arc<EventBuffer>,
    shutdown: CancellationToken,
}

/// A running HTTP transport.
pub struct HttpComm {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    subscription: Subscription,
    server_task: Mutex<Option<JoinHandle<()>>>,
}

impl HttpComm {
    /// Binds the listener, subscribes to the event bus and starts serving.
    pub async fn create_and_start(config: HttpConfig, ctx: CommContext) -> TransportResult<Self> {
        let addr = config.bind_addr();
        info!(addr = %addr, "Starting HTTP transport");

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| TransportError::BindFailed {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;
        let local_addr = listener.local_addr()?;

        let buffer = Arc::new(EventBuffer::new());
        let subscription = ctx.subscribe(buffer.clone());
        let shutdown = CancellationToken::new();

        let state = Arc::new(HttpState {
            ctx,
            buffer,
            shutdown: shutdown.clone(),
        });
        let router = Router::new().fallback(http_handler).with_state(state);

        let token = shutdown.clone();
        let server_task = tokio::spawn(async move {
            let server = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { token.cancelled().await });

            if let Err(e) = server.await {
                error!(addr = %local_addr, error = %e, "HTTP server error");
            }
        });

        info!(addr = %local_addr, "HTTP transport started");
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
impl Comm for HttpComm {
    fn kind(&self) -> &'static str {
        "http"
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
            join_task(task, "http server").await;
        }
        info!(addr = %self.local_addr, "HTTP transport stopped");
    }
}

// =============================================================================
// Request handling
// =============================================================================

async fn http_handler(
    State(state): State<Arc<HttpState>>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    trace!(remote_addr = %remote_addr, method = %method, path = %uri.path(), "HTTP request");

    if method == Method::GET && uri.path() == "/" {
        return (
            StatusCode::OK,
            format!("Hello from onebot-rs v{}", env!("CARGO_PKG_VERSION")),
        )
            .into_response();
    }

    if method != Method::POST {
        warn!(remote_addr = %remote_addr, method = %method, "Actions must be sent with POST");
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if !auth::authorize(state.ctx.access_token(), authorization, uri.query()) {
        warn!(remote_addr = %remote_addr, "Rejected HTTP request with invalid access token");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let binary = match wire_mode(content_type) {
        Some(binary) => binary,
        None => {
            warn!(remote_addr = %remote_addr, content_type = %content_type, "Unsupported action content type");
            let rejected = RawResponse::from(ActionError::bad_request(format!(
                "content type must be {CONTENT_TYPE_JSON} or {CONTENT_TYPE_MSGPACK}"
            )));
            return encoded(&rejected, false);
        }
    };

    let response = match codec::parse_request(&body, binary) {
        Ok(request) if request.action == GET_LATEST_EVENTS => latest_events(&state, request).await,
        Ok(request) => {
            debug!(remote_addr = %remote_addr, action = %request.action, binary, "HTTP action");
            frame::dispatch_guarded(state.ctx.router(), request).await
        }
        Err(rejected) => {
            debug!(remote_addr = %remote_addr, reason = %rejected.message, "Rejected HTTP action");
            rejected
        }
    };

    encoded(&response, binary)
}

/// Maps a content type to its wire mode: `Some(false)` for JSON,
/// `Some(true)` for MessagePack.
fn wire_mode(content_type: &str) -> Option<bool> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        CONTENT_TYPE_JSON => Some(false),
        CONTENT_TYPE_MSGPACK | "application/x-msgpack" => Some(true),
        _ => None,
    }
}

async fn latest_events(state: &HttpState, request: RawRequest) -> RawResponse {
    let params: GetLatestEvents = if request.params.is_null() {
        GetLatestEvents::default()
    } else {
        match serde_json::from_value(request.params) {
            Ok(params) => params,
            Err(e) => {
                return RawResponse::from(ActionError::bad_param(format!("invalid params: {e}")))
                    .with_echo(request.echo);
            }
        }
    };

    let events = state
        .buffer
        .poll(params.limit, Duration::from_secs(params.timeout), &state.shutdown)
        .await;
    debug!(count = events.len(), "Drained HTTP event buffer");
    RawResponse::ok(Value::Array(events)).with_echo(request.echo)
}

fn encoded(response: &RawResponse, binary: bool) -> Response {
    let content_type = if binary {
        CONTENT_TYPE_MSGPACK
    } else {
        CONTENT_TYPE_JSON
    };
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        codec::encode_response(response, binary),
    )
        .into_response()
}
