//! HTTP server implementation using Axum.

use crate::handlers::{handle_health, handle_rpc};
use axum::{
    routing::{get, post},
    Router,
};
use qrlink_core::QrLinkApi;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Application state shared across handlers.
pub struct AppState {
    pub api: QrLinkApi,
}

/// A running server. Dropping it leaves the server running.
pub struct ServerHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            error!("Server task failed: {}", e);
        }
    }
}

/// Build the router.
pub fn router(api: QrLinkApi) -> Router {
    let state = Arc::new(AppState { api });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/rpc", post(handle_rpc))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the JSON-RPC HTTP server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(
    api: QrLinkApi,
    host: &str,
    port: u16,
) -> anyhow::Result<(SocketAddr, ServerHandle)> {
    let app = router(api);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
        if let Err(e) = served {
            error!("Server error: {}", e);
        }
    });

    Ok((
        actual_addr,
        ServerHandle {
            shutdown: shutdown_tx,
            task,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_server_starts_and_stops() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        let api = QrLinkApi::builder()
            .with_default_roots(false)
            .with_allowed_root(root.clone())
            .with_base_dir(root)
            .with_environment(None)
            .build()
            .await
            .unwrap();

        let (addr, handle) = start_server(api, "127.0.0.1", 0).await.unwrap();
        assert!(addr.port() > 0);
        handle.shutdown().await;
    }
}
