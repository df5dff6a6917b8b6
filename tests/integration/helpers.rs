//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tower::ServiceExt;

use sentinel_api::AppState;
use sentinel_auth::StaticIdentityProvider;
use sentinel_core::config::AppConfig;
use sentinel_core::types::{ConnectionId, UserId};
use sentinel_realtime::SentinelHub;
use sentinel_realtime::message::{InboundMessage, OutboundMessage};

/// Password accepted for every test user.
pub const PASSWORD: &str = "secret";

/// Configuration used by most tests: join-time detection off so only the
/// messages a test provokes arrive.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.dev_password = Some(PASSWORD.to_string());
    config.risk.detector.enabled = false;
    config
}

/// Test application context
pub struct TestApp {
    /// The Axum router for making test requests
    pub router: Router,
    /// The hub behind it
    pub hub: Arc<SentinelHub>,
    /// Shared state
    pub state: AppState,
}

/// Response from [`TestApp::request`]
pub struct TestResponse {
    /// HTTP status
    pub status: StatusCode,
    /// Parsed JSON body, `Null` when empty
    pub body: Value,
}

impl TestApp {
    /// Create a new test application
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Create a test application with a custom configuration
    pub fn with_config(config: AppConfig) -> Self {
        let identity =
            StaticIdentityProvider::from_config(&config.auth).expect("identity provider");
        let config = Arc::new(config);
        let hub = SentinelHub::start(&config, Arc::new(identity));
        let state = AppState::new(config, Arc::clone(&hub));
        let router = sentinel_api::build_app(state.clone());
        Self { router, hub, state }
    }

    /// Make an HTTP request against the router
    pub async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        let body = match body {
            Some(body) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("response");

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        TestResponse { status, body }
    }

    /// Attach a connection without joining
    pub fn attach(&self) -> TestClient {
        let (handle, rx) = self.hub.attach(Some("test".to_string()));
        TestClient {
            hub: Arc::clone(&self.hub),
            conn_id: handle.id,
            rx,
        }
    }

    /// Attach a connection and join it as `user_id`/`app_name`
    pub async fn join(&self, user_id: &str, app_name: &str) -> TestClient {
        let mut client = self.attach();
        client
            .send(InboundMessage::Join {
                user_id: UserId::from(user_id),
                app_name: app_name.to_string(),
            })
            .await;
        match client.recv().await {
            OutboundMessage::Joined { .. } => client,
            other => panic!("expected JOINED, got {other:?}"),
        }
    }

    /// Serve the app on an ephemeral port; drop the sender to stop
    pub async fn spawn_server(&self) -> (SocketAddr, oneshot::Sender<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let state = self.state.clone();
        tokio::spawn(async move {
            let _ = sentinel_api::serve(listener, state, async move {
                let _ = stop_rx.await;
            })
            .await;
        });
        (addr, stop_tx)
    }
}

/// An in-process connection to the hub
pub struct TestClient {
    hub: Arc<SentinelHub>,
    /// Connection ID
    pub conn_id: ConnectionId,
    /// Frames from the hub
    pub rx: mpsc::Receiver<OutboundMessage>,
}

impl TestClient {
    /// Send a frame to the hub
    pub async fn send(&self, message: InboundMessage) {
        self.hub
            .handle_message(self.conn_id, message)
            .await
            .expect("handle message");
    }

    /// Send a raw text frame
    pub async fn send_raw(&self, raw: &str) {
        self.hub.handle_frame(self.conn_id, raw).await;
    }

    /// Next frame, failing after five seconds
    pub async fn recv(&mut self) -> OutboundMessage {
        self.recv_within(Duration::from_secs(5)).await
    }

    /// Next frame, failing after `limit`
    pub async fn recv_within(&mut self, limit: Duration) -> OutboundMessage {
        tokio::time::timeout(limit, self.rx.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed")
    }

    /// Assert nothing arrives within 100ms
    pub async fn assert_silent(&mut self) {
        let got = tokio::time::timeout(Duration::from_millis(100), self.rx.recv()).await;
        if let Ok(Some(message)) = got {
            panic!("expected no frame, got {message:?}");
        }
    }

    /// Drop the transport
    pub async fn disconnect(self) {
        self.hub.on_disconnect(self.conn_id).await;
    }
}
