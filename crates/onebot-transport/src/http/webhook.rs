//! HTTP webhook transport: every event is POSTed to the consumer.
//!
//! Each event gets its own request task; there is no ordering between
//! events and no retry. A `200` response whose body is a JSON array of
//! action requests is treated as a batch of quick actions and dispatched
//! through the router, their responses discarded.

use std::sync::Arc;

use async_trait::async_trait;
use onebot_core::{
    Comm, CommContext, EventSubscriber, HttpWebhookConfig, PushedEvent, RawRequest, Subscription,
    TransportError, TransportResult,
};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder, StatusCode};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::auth;
use crate::frame;
use crate::validate::is_valid_http_url;

struct WebhookPusher {
    client: Client,
    url: String,
    ctx: CommContext,
    runtime: Handle,
    shutdown: CancellationToken,
}

impl EventSubscriber for WebhookPusher {
    fn on_event(&self, event: &Arc<PushedEvent>) {
        let client = self.client.clone();
        let url = self.url.clone();
        let ctx = self.ctx.clone();
        let event = Arc::clone(event);
        let shutdown = self.shutdown.clone();

        self.runtime.spawn(async move {
            tokio::select! {
                () = shutdown.cancelled() => {
                    trace!(event = %event.name(), "Webhook push cancelled");
                }
                result = push_event(&client, &url, &ctx, &event) => {
                    if let Err(e) = result {
                        warn!(url = %url, event = %event.name(), error = %e, "HTTP webhook push failed");
                    }
                }
            }
        });
    }
}

async fn push_event(
    client: &Client,
    url: &str,
    ctx: &CommContext,
    event: &PushedEvent,
) -> TransportResult<()> {
    debug!(url = %url, event = %event.name(), "Pushing event via HTTP webhook");

    let mut request = client
        .post(url)
        .header(CONTENT_TYPE, "application/json")
        .body(event.json().to_owned());
    if let Some(token) = ctx.access_token() {
        request = request.bearer_auth(token);
    }

    let response = request
        .send()
        .await
        .map_err(|e| TransportError::SendFailed(e.to_string()))?;

    let status = response.status();
    if status == StatusCode::NO_CONTENT {
        return Ok(());
    }
    if !status.is_success() {
        return Err(TransportError::SendFailed(format!(
            "webhook returned status {}",
            status.as_u16()
        )));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| TransportError::SendFailed(format!("failed to read response: {e}")))?;

    // Anything other than an array of requests is an ordinary acknowledgement.
    let Ok(actions) = serde_json::from_slice::<Vec<RawRequest>>(&body) else {
        return Ok(());
    };
    for action in actions {
        if action.action.trim().is_empty() {
            continue;
        }
        trace!(action = %action.action, "Running webhook quick action");
        let response = frame::dispatch_guarded(ctx.router(), action).await;
        if !response.is_ok() {
            debug!(retcode = %response.retcode, message = %response.message, "Webhook quick action failed");
        }
    }
    Ok(())
}

/// A running HTTP webhook transport.
pub struct HttpWebhookComm {
    url: String,
    shutdown: CancellationToken,
    subscription: Subscription,
}

impl HttpWebhookComm {
    /// Validates the target URL and subscribes to the event bus.
    ///
    /// Pushes are spawned on the runtime this is called from.
    pub async fn create_and_start(config: HttpWebhookConfig, ctx: CommContext) -> TransportResult<Self> {
        info!(url = %config.url, "Starting HTTP webhook transport");

        if !is_valid_http_url(&config.url) {
            return Err(TransportError::InvalidConfig(format!(
                "invalid HTTP webhook URL: {}",
                config.url
            )));
        }

        let runtime = Handle::try_current().map_err(|e| TransportError::Io(e.to_string()))?;
        let client = build_client(&config, ctx.platform())?;
        let shutdown = CancellationToken::new();
        let pusher = Arc::new(WebhookPusher {
            client,
            url: config.url.clone(),
            ctx: ctx.clone(),
            runtime,
            shutdown: shutdown.clone(),
        });
        let subscription = ctx.subscribe(pusher);

        info!(url = %config.url, "HTTP webhook transport started");
        Ok(Self {
            url: config.url,
            shutdown,
            subscription,
        })
    }
}

fn build_client(config: &HttpWebhookConfig, platform: &str) -> TransportResult<Client> {
    let mut headers = HeaderMap::new();
    for (name, value) in auth::protocol_headers(platform) {
        let value = HeaderValue::from_str(&value)
            .map_err(|e| TransportError::InvalidConfig(format!("invalid header {name}: {e}")))?;
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::InvalidConfig(format!("invalid header {name}: {e}")))?;
        headers.insert(name, value);
    }

    let mut builder = ClientBuilder::new().default_headers(headers);
    if let Some(timeout) = config.timeout() {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| TransportError::InvalidConfig(e.to_string()))
}

#[async_trait]
impl Comm for HttpWebhookComm {
    fn kind(&self) -> &'static str {
        "http_webhook"
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }

    async fn stop(&self) {
        if !self.subscription.cancel() {
            return;
        }
        self.shutdown.cancel();
        info!(url = %self.url, "HTTP webhook transport stopped");
    }
}

#[cfg(all(test, feature = "http-server"))]
mod tests {
    use super::*;
    use axum::{Router, extract::State, http::HeaderMap, routing::post};
    use onebot_core::{ActionMux, ActionResult, EventBus, HttpWebhookConfig, Request};
    use serde_json::{Value, json};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    type Received = mpsc::UnboundedSender<(HeaderMap, Value)>;

    async fn consumer(State(tx): State<Received>, headers: HeaderMap, body: String) -> String {
        let value: Value = serde_json::from_str(&body).unwrap_or_default();
        let _ = tx.send((headers, value));
        json!([{"action": "mark_read", "params": {"id": "m1"}}]).to_string()
    }

    async fn spawn_consumer() -> (String, mpsc::UnboundedReceiver<(HeaderMap, Value)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/", post(consumer)).with_state(tx);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{addr}/"), rx)
    }

    #[tokio::test]
    async fn test_rejects_invalid_url() {
        let ctx = CommContext::new("test", Arc::new(ActionMux::new()), Arc::new(EventBus::new()));
        for url in ["ftp://x", "ws://contoso.com", "test_data"] {
            let result = HttpWebhookComm::create_and_start(HttpWebhookConfig::new(url), ctx.clone()).await;
            assert!(matches!(result, Err(TransportError::InvalidConfig(_))), "{url}");
        }
        assert_eq!(ctx.bus().subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_pushes_events_and_runs_quick_actions() {
        let (url, mut received) = spawn_consumer().await;

        let (marked_tx, mut marked_rx) = mpsc::unbounded_channel::<String>();
        let router = Arc::new(ActionMux::new());
        router
            .register("mark_read", move |request: Request<Value>| {
                let marked_tx = marked_tx.clone();
                async move {
                    let _ = marked_tx.send(request.params["id"].as_str().unwrap_or_default().to_string());
                    Ok::<_, onebot_core::ActionError>(())
                }
            })
            .unwrap();
        let ctx = CommContext::new("qq", router, Arc::new(EventBus::new())).with_access_token(Some("tok"));

        let comm = HttpWebhookComm::create_and_start(HttpWebhookConfig::new(&url), ctx.clone())
            .await
            .unwrap();

        let event = PushedEvent::new("meta.connect", &json!({"type": "meta", "detail_type": "connect"})).unwrap();
        ctx.bus().broadcast(Arc::new(event));

        let (headers, body) = tokio::time::timeout(Duration::from_secs(5), received.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(body["detail_type"], "connect");
        assert_eq!(headers["authorization"], "Bearer tok");
        assert_eq!(headers["x-onebot-version"], "12");
        assert_eq!(headers["x-impl"], "qq");

        let marked = tokio::time::timeout(Duration::from_secs(5), marked_rx.recv())
            .await
            .unwrap();
        assert_eq!(marked.as_deref(), Some("m1"));

        comm.stop().await;
        assert_eq!(ctx.bus().subscriber_count(), 0);
    }
}
