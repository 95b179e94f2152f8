use crate::config::ANY_ORIGIN;
use crate::server::ServerState;
use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use sigrelay_common::Pin;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    sessions: usize,
    connections: usize,
}

/// Readiness check response.
#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    ready: bool,
}

/// Pins with an open camera.
#[derive(Serialize)]
struct CamerasResponse {
    cameras: Vec<Pin>,
}

/// State shared by the HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    server: Arc<ServerState>,
    ready: Arc<AtomicBool>,
}

impl HttpState {
    /// Wrap the signaling server state; starts out ready.
    #[must_use]
    pub fn new(server: Arc<ServerState>) -> Self {
        Self {
            server,
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Mark the service as ready.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    /// Check if the service is ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers(Any);
    if origin == ANY_ORIGIN {
        return layer.allow_origin(Any);
    }
    match HeaderValue::from_str(origin) {
        Ok(value) => layer.allow_origin(value),
        Err(_) => {
            tracing::warn!(origin, "invalid cors origin, cross-origin requests disabled");
            layer
        }
    }
}

/// Build the health, introspection and (optionally) metrics routes.
pub fn router(state: HttpState, prometheus: Option<PrometheusHandle>) -> Router {
    let cors = cors_layer(&state.server.config.cors_origin);
    let mut app = Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/cameras", get(cameras_handler));
    if let Some(handle) = prometheus {
        app = app.route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        );
    }
    app.layer(cors).with_state(state)
}

/// Install the Prometheus recorder and serve [`router`] on `addr`.
///
/// # Errors
///
/// Returns an error if installing the recorder or binding the listener fails.
pub async fn start_http_server(addr: SocketAddr, state: HttpState) -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let app = router(state, Some(handle));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("http server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Uptime, session count and connection count.
async fn health_handler(State(state): State<HttpState>) -> (StatusCode, Json<HealthResponse>) {
    let server = &state.server;
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            uptime_secs: server.uptime().as_secs(),
            sessions: server.registry.len(),
            connections: server.active_connections.load(Ordering::Relaxed),
        }),
    )
}

/// Readiness check handler - returns 200 if ready, 503 if not.
async fn ready_handler(State(state): State<HttpState>) -> (StatusCode, Json<ReadyResponse>) {
    if state.is_ready() {
        (
            StatusCode::OK,
            Json(ReadyResponse {
                status: "ready",
                ready: true,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                status: "not ready",
                ready: false,
            }),
        )
    }
}

async fn cameras_handler(State(state): State<HttpState>) -> Json<CamerasResponse> {
    Json(CamerasResponse {
        cameras: state.server.registry.camera_pins(),
    })
}
