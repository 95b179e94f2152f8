use crate::config::ServerConfig;
use crate::connection::{handle_connection, ConnGuard};
use crate::error::SignalError;
use crate::registry::{ConnId, SessionRegistry};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Shared state for the signaling server.
#[derive(Debug)]
pub struct ServerState {
    /// Pin → session table.
    pub registry: SessionRegistry,
    /// Runtime server configuration.
    pub config: ServerConfig,
    /// Number of connections currently being served.
    pub active_connections: AtomicUsize,
    /// Instant the server state was created, for uptime reporting.
    pub started_at: Instant,
    next_conn_id: AtomicU64,
}

impl ServerState {
    /// Fresh state with an empty registry.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            registry: SessionRegistry::new(),
            config,
            active_connections: AtomicUsize::new(0),
            started_at: Instant::now(),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Allocate an identifier for a newly accepted connection.
    pub fn next_conn_id(&self) -> ConnId {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Time since the state was created.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// # Errors
///
/// Returns an error if the accept loop encounters an I/O failure.
pub async fn run(listener: TcpListener, state: Arc<ServerState>) -> Result<(), SignalError> {
    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    run_with_shutdown(listener, state, shutdown_rx).await
}

/// Run the server accept loop with an externally-controlled shutdown signal.
///
/// When the sender side of `shutdown_rx` sends or is dropped, the accept
/// loop stops accepting new connections and every open connection is sent a
/// Close frame and released as if the client had closed it. In-flight
/// connections get up to 30 seconds to finish.
///
/// # Errors
///
/// Returns an error if the accept loop encounters an I/O failure.
pub async fn run_with_shutdown(
    listener: TcpListener,
    state: Arc<ServerState>,
    mut shutdown_rx: watch::Receiver<()>,
) -> Result<(), SignalError> {
    let local_addr = listener.local_addr().map_err(SignalError::Io)?;
    info!("signaling server listening on {}", local_addr);
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        if state.active_connections.load(Ordering::Relaxed) >= state.config.max_conns {
                            warn!("max connections reached, rejecting {}", addr);
                            drop(stream);
                            continue;
                        }
                        let guard = ConnGuard::acquire(Arc::clone(&state));
                        let state = Arc::clone(&state);
                        let conn_shutdown = shutdown_rx.clone();
                        tasks.spawn(async move {
                            if let Err(e) = handle_connection(stream, addr, state, conn_shutdown, guard).await {
                                tracing::debug!("connection from {} closed: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("failed to accept connection: {}", e);
                    }
                }
            }
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            _ = shutdown_rx.changed() => {
                info!("shutdown signal received, draining {} connections", tasks.len());
                break;
            }
        }
    }

    let drain_timeout = Duration::from_secs(30);
    let drained = tokio::time::timeout(drain_timeout, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(
            "drain timeout reached with {} connections still active",
            tasks.len()
        );
        tasks.abort_all();
    }

    info!("server shut down gracefully");
    Ok(())
}
