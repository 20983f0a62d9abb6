//! HTTP/WebSocket front door and server lifecycle.

use crate::config::ServerConfig;
use crate::connection::serve_socket;
use crate::coordinator::Coordinator;
use crate::registry::SessionRegistry;
use axum::body::Body;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{HeaderValue, Method, Request};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, info, instrument, warn};

/// State shared by all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    coordinator: Arc<Coordinator>,
    heartbeat: Duration,
}

impl AppState {
    /// Wires a fresh registry and coordinator from `config`.
    #[instrument(skip(config))]
    pub fn from_config(config: &ServerConfig) -> Self {
        let registry = SessionRegistry::with_id_len(*config.session_id_len());
        Self {
            coordinator: Arc::new(Coordinator::new(registry, *config.send_queue())),
            heartbeat: config.heartbeat(),
        }
    }

    /// The connection coordinator.
    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }
}

/// Builds the router: `/ws` for game traffic, `/health` for probes.
#[instrument(skip(state, config))]
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(cors_layer(config))
        .layer(ServiceBuilder::new().map_request(|req: Request<Body>| {
            debug!(method = %req.method(), uri = %req.uri(), "Incoming HTTP request");
            req
        }))
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins()
        .into_iter()
        .filter_map(|origin| match HeaderValue::from_str(&origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(%origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    info!(origins = origins.len(), "CORS origins configured");

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_credentials(true)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(socket, state.coordinator, state.heartbeat))
}

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    sessions: usize,
    connections: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        sessions: state.coordinator.registry().len(),
        connections: state.coordinator.connection_count(),
    })
}

/// Periodically deletes sessions nobody is connected to.
pub fn spawn_sweeper(coordinator: Arc<Coordinator>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            coordinator.sweep().await;
        }
    })
}

/// Running server; dropping it leaves the tasks running, [`ServerHandle::shutdown`] stops them.
#[derive(Debug)]
pub struct ServerHandle {
    addr: SocketAddr,
    state: AppState,
    server: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

impl ServerHandle {
    /// Address the listener is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shared state, mainly for inspection in tests.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Stops the server and sweeper tasks.
    pub fn shutdown(self) {
        self.server.abort();
        self.sweeper.abort();
    }
}

/// Binds the configured address and serves in the background.
#[instrument(skip(config), fields(host = %config.host(), port = config.port()))]
pub async fn start(config: &ServerConfig) -> std::io::Result<ServerHandle> {
    let state = AppState::from_config(config);
    let router = build_router(state.clone(), config);

    let listener = TcpListener::bind((config.host().as_str(), *config.port())).await?;
    let addr = listener.local_addr()?;
    info!(%addr, "Duel server listening");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            warn!(error = %e, "Server exited with error");
        }
    });
    let sweeper = spawn_sweeper(Arc::clone(&state.coordinator), config.sweep_interval());

    Ok(ServerHandle {
        addr,
        state,
        server,
        sweeper,
    })
}

/// Serves until Ctrl+C.
#[instrument(skip(config))]
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(&config);
    let router = build_router(state.clone(), &config);

    let listener = TcpListener::bind((config.host().as_str(), *config.port())).await?;
    let addr = listener.local_addr()?;
    info!(%addr, environment = %config.environment(), "Duel server listening");
    info!("WebSocket endpoint at /ws, health probe at /health");

    let sweeper = spawn_sweeper(Arc::clone(&state.coordinator), config.sweep_interval());

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl+C");
            }
            info!("Shutting down");
        })
        .await?;

    sweeper.abort();
    Ok(())
}
