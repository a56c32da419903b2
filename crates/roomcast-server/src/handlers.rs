//! HTTP and WebSocket handlers for the Roomcast server.
//!
//! This module wires the router and runs a WebSocket connection from upgrade
//! to close.

use crate::api;
use crate::config::{Config, CorsConfig};
use crate::metrics::{self, ConnectionMetricsGuard};
use crate::store::{MemoryStore, Store};
use anyhow::{Context, Result};
use axum::{
    extract::{ws::WebSocket, Path, State, WebSocketUpgrade},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use roomcast_core::{validate_room_id, Hub, HubConfig, HubHandle};
use roomcast_transport::{websocket, CloseReason, Connection};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, error, info, warn};

/// How long open connections get to flush and close after the hub stops.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared server state.
pub struct AppState {
    /// Entry point to the broadcast hub.
    pub hub: HubHandle,
    /// Room and message persistence.
    pub store: Arc<dyn Store>,
    /// Server configuration.
    pub config: Config,
    /// Running WebSocket connection tasks.
    pub connections: TaskTracker,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config, hub: HubHandle, store: Arc<dyn Store>) -> Self {
        Self {
            hub,
            store,
            config,
            connections: TaskTracker::new(),
        }
    }
}

/// Build the application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let ws_path = state.config.transport.websocket_path.clone();
    let ws_route = state.config.websocket_route();
    let cors = cors_layer(&state.config.cors);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/room", post(api::create_room))
        .route("/api/room/:id", get(api::get_room).patch(api::update_room))
        .route("/api/room/:id/connections", get(api::room_connections))
        .route("/api/message", post(api::post_message))
        .route("/api/message/:room_id", get(api::get_messages))
        .route(&ws_path, get(missing_room_handler))
        .route(&ws_route, get(ws_handler))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins = if config.allowed_origins.is_empty() {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

/// Run the HTTP/WebSocket server until Ctrl-C or SIGTERM.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let (hub, hub_task) = Hub::spawn(HubConfig::from(&config.hub));
    let state = Arc::new(AppState::new(
        config.clone(),
        hub.clone(),
        Arc::new(MemoryStore::new()),
    ));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
        metrics::spawn_stats_reporter(
            hub.clone(),
            Duration::from_millis(config.metrics.stats_interval_ms.max(1)),
        );
    }

    let app = build_router(Arc::clone(&state));

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Roomcast server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr,
        config.websocket_route()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    drain_and_stop(&state, hub_task, DRAIN_TIMEOUT).await?;

    info!("Roomcast server stopped");
    Ok(())
}

/// Stop the hub, then wait up to `deadline` for open connections to flush
/// their queues and send a close frame.
///
/// # Errors
///
/// Returns an error if the hub task panicked.
pub async fn drain_and_stop(
    state: &AppState,
    hub_task: JoinHandle<()>,
    deadline: Duration,
) -> Result<()> {
    info!("Shutting down hub");
    state.hub.shutdown();
    hub_task.await.context("Hub task failed")?;

    state.connections.close();
    let open = state.connections.len();
    if tokio::time::timeout(deadline, state.connections.wait())
        .await
        .is_err()
    {
        warn!(
            connections = state.connections.len(),
            "Connections still open after drain deadline"
        );
    } else if open > 0 {
        info!(connections = open, "Drained open connections");
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.hub.stats();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "rooms": stats.room_count,
        "connections": stats.connection_count,
        "evictions": stats.evictions,
    }))
}

/// Upgrade requests that carry no room ID.
async fn missing_room_handler() -> Response {
    (StatusCode::BAD_REQUEST, "Room ID not provided").into_response()
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    if let Err(reason) = validate_room_id(&room_id) {
        debug!(room = %room_id, reason, "Rejected WebSocket upgrade");
        return (StatusCode::BAD_REQUEST, reason).into_response();
    }

    let connections = state.connections.clone();
    ws.max_message_size(state.config.transport.max_message_size)
        .on_upgrade(move |socket| {
            connections.track_future(handle_websocket(socket, room_id, state))
        })
}

/// Run one WebSocket connection until it closes.
async fn handle_websocket(socket: WebSocket, room_id: String, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (reader, writer) = websocket::split(socket);
    let connection = Connection::open(state.hub.clone(), room_id, reader, writer);
    let connection_id = connection.id().clone();

    debug!(connection = %connection_id, room = %connection.room_id(), "WebSocket connected");

    let reason = connection.run().await;
    match reason {
        CloseReason::ReadError => metrics::record_error("websocket_read"),
        CloseReason::WriteError => metrics::record_error("websocket_write"),
        CloseReason::PeerClosed | CloseReason::QueueClosed => {}
    }

    debug!(connection = %connection_id, %reason, "WebSocket disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Room;
    use futures_util::StreamExt;
    use serde_json::Value;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    async fn spawn_server() -> (std::net::SocketAddr, Arc<AppState>) {
        let (hub, _task) = Hub::spawn(HubConfig::default());
        let state = Arc::new(AppState::new(
            Config::default(),
            hub,
            Arc::new(MemoryStore::new()),
        ));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = build_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (addr, state)
    }

    async fn wait_for_connections(hub: &HubHandle, room_id: &str, expected: usize) {
        for _ in 0..200 {
            hub.flush().await;
            if hub.connection_count(room_id) == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("room {room_id} never reached {expected} connections");
    }

    #[tokio::test]
    async fn test_health_reports_hub_stats() {
        let (hub, _task) = Hub::spawn(HubConfig { queue_capacity: 1 });
        let state = Arc::new(AppState::new(
            Config::default(),
            hub.clone(),
            Arc::new(MemoryStore::new()),
        ));

        // `fast` drains between broadcasts; `slow` never reads and is evicted.
        let mut fast = hub.register("health-room");
        let _slow = hub.register("health-room");
        hub.broadcast_to_room("health-room", "one").unwrap();
        hub.flush().await;
        assert!(fast.try_recv().is_ok());
        hub.broadcast_to_room("health-room", "two").unwrap();
        hub.flush().await;

        let response = health_handler(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["rooms"], 1);
        assert_eq!(value["connections"], 1);
        assert_eq!(value["evictions"], 1);
    }

    #[tokio::test]
    async fn test_websocket_receives_posted_message() {
        let (addr, state) = spawn_server().await;
        let room: Room = state.store.create_room("lobby".to_string()).await.unwrap();

        let url = format!("ws://{}/ws/{}", addr, room.id);
        let (mut client, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        wait_for_connections(&state.hub, &room.id, 1).await;

        let message = state
            .store
            .post_message(crate::store::NewMessage {
                body: "hello".to_string(),
                room_id: room.id.clone(),
                sender_id: "bob".to_string(),
            })
            .await
            .unwrap();
        api::broadcast_new_message(&state.hub, &message);

        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = match frame {
            WsMessage::Text(text) => text,
            other => panic!("expected a text frame, got {other:?}"),
        };
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "new_message");
        assert_eq!(value["message"]["body"], "hello");
        assert_eq!(value["message"]["room_id"], room.id.as_str());

        client.close(None).await.unwrap();
        wait_for_connections(&state.hub, &room.id, 0).await;
        assert!(!state.hub.room_exists(&room.id));
    }

    #[tokio::test]
    async fn test_hub_shutdown_closes_websocket() {
        let (addr, state) = spawn_server().await;

        let url = format!("ws://{}/ws/shutdown-room", addr);
        let (mut client, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        wait_for_connections(&state.hub, "shutdown-room", 1).await;

        state.hub.shutdown();

        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .unwrap();
        assert!(
            matches!(frame, Some(Ok(WsMessage::Close(_)))),
            "expected a close frame, got {frame:?}"
        );
    }

    #[test]
    fn test_shutdown_drains_connections_before_returning() {
        const FRAMES: usize = 50;

        let (addr_tx, addr_rx) = std::sync::mpsc::channel();

        // The client runs on its own runtime so it outlives the server's.
        let client = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let addr: std::net::SocketAddr = addr_rx.recv().unwrap();
                let url = format!("ws://{}/ws/drain-room", addr);
                let (mut client, _) = tokio_tungstenite::connect_async(url).await.unwrap();

                let mut texts = 0;
                let closed = tokio::time::timeout(Duration::from_secs(5), async {
                    while let Some(frame) = client.next().await {
                        match frame {
                            Ok(WsMessage::Text(_)) => texts += 1,
                            Ok(WsMessage::Close(_)) => return true,
                            Ok(_) => {}
                            Err(_) => return false,
                        }
                    }
                    false
                })
                .await
                .unwrap_or(false);
                (texts, closed)
            })
        });

        let server = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        server.block_on(async {
            let (hub, hub_task) = Hub::spawn(HubConfig::default());
            let state = Arc::new(AppState::new(
                Config::default(),
                hub,
                Arc::new(MemoryStore::new()),
            ));

            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            addr_tx.send(listener.local_addr().unwrap()).unwrap();

            let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
            let app = build_router(Arc::clone(&state));
            let serving = tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async {
                        let _ = stop_rx.await;
                    })
                    .await
                    .unwrap();
            });

            wait_for_connections(&state.hub, "drain-room", 1).await;
            for i in 0..FRAMES {
                state.hub.broadcast_to_room("drain-room", &i).unwrap();
            }

            stop_tx.send(()).unwrap();
            serving.await.unwrap();
            drain_and_stop(&state, hub_task, Duration::from_secs(5))
                .await
                .unwrap();
            assert!(state.connections.is_empty());
        });
        drop(server);

        let (texts, closed) = client.join().unwrap();
        assert_eq!(texts, FRAMES);
        assert!(closed, "client never saw a close frame");
    }

    #[tokio::test]
    async fn test_websocket_without_room_is_rejected() {
        let (addr, state) = spawn_server().await;

        let url = format!("ws://{}/ws", addr);
        let result = tokio_tungstenite::connect_async(url).await;
        match result {
            Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
                assert_eq!(response.status().as_u16(), 400);
            }
            Err(e) => panic!("expected HTTP 400, got {e}"),
            Ok(_) => panic!("upgrade without a room ID was accepted"),
        }

        // A whitespace-only ID is rejected the same way.
        let url = format!("ws://{}/ws/%20%20", addr);
        match tokio_tungstenite::connect_async(url).await {
            Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
                assert_eq!(response.status().as_u16(), 400);
            }
            Err(e) => panic!("expected HTTP 400, got {e}"),
            Ok(_) => panic!("upgrade with a blank room ID was accepted"),
        }

        assert!(state.hub.room_ids().is_empty());
    }
}
