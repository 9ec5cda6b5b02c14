use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use forum_chat::{ConnectionRegistry, Dispatcher};
use forum_store::{Database, StoreError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{api, ws};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: IpAddr,
    pub port: u16,
    /// Per-peer outbound chat queue. Frames beyond this are dropped for
    /// that peer.
    pub send_queue_capacity: usize,
    /// Directory holding `index.html`, `css/`, `js/` and the other pages.
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            send_queue_capacity: 256,
            static_dir: PathBuf::from("frontend"),
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub dispatcher: Dispatcher,
    pub send_queue_capacity: usize,
}

impl AppState {
    pub fn new(db: Database, send_queue_capacity: usize) -> Self {
        Self {
            db,
            dispatcher: Dispatcher::new(Arc::new(ConnectionRegistry::new())),
            send_queue_capacity,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        self.dispatcher.registry()
    }
}

/// Build the Axum router with all routes. Anything not matched is looked
/// up under `static_dir`.
pub fn build_router(state: AppState, static_dir: &Path) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/register", post(api::register))
        .route("/login", post(api::login))
        .route(
            "/posts",
            get(api::list_posts)
                .post(api::create_post)
                .delete(api::delete_post),
        )
        .route("/health", get(health_handler))
        .fallback_service(ServeDir::new(static_dir))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and start serving. Returns once the listener is up.
pub async fn start(config: ServerConfig, db: Database) -> Result<ServerHandle, std::io::Error> {
    let state = AppState::new(db, config.send_queue_capacity);
    let registry = Arc::clone(state.registry());
    let router = build_router(state, &config.static_dir);

    let listener = tokio::net::TcpListener::bind(SocketAddr::new(config.bind_addr, config.port)).await?;
    let local_addr = listener.local_addr()?;

    info!(
        addr = %local_addr,
        static_dir = %config.static_dir.display(),
        send_queue = config.send_queue_capacity,
        "forum server started"
    );

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    let server = tokio::spawn(async move {
        let result = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { signal.cancelled().await })
        .await;
        if let Err(e) = result {
            error!(error = %e, "server error");
        }
    });

    Ok(ServerHandle {
        local_addr,
        registry,
        shutdown,
        server,
    })
}

/// Handle returned by `start()`.
pub struct ServerHandle {
    local_addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    shutdown: CancellationToken,
    server: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Number of chat peers currently registered.
    pub fn peer_count(&self) -> usize {
        self.registry.len()
    }

    /// Stop accepting, end every chat session, and wait for the listener
    /// task to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let peers = self.registry.shutdown_all();
        info!(peers, "shutting down");
        if let Err(e) = self.server.await {
            error!(error = %e, "server task failed");
        }
    }
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let peers = state.registry().len();
    let db = state.db.clone();
    let db_ok = api::blocking(move || {
        db.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(StoreError::from)
        })
    })
    .await
    .is_ok();

    let (status, label) = if db_ok {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };
    (status, Json(serde_json::json!({ "status": label, "peers": peers })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ServerConfig {
        ServerConfig {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0, // Random port
            ..Default::default()
        }
    }

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.send_queue_capacity, 256);
        assert_eq!(config.static_dir, PathBuf::from("frontend"));
    }

    #[test]
    fn build_router_creates_routes() {
        let state = AppState::new(Database::in_memory().unwrap(), 32);
        let _router = build_router(state, Path::new("frontend"));
        // If this doesn't panic, the router was built successfully
    }

    #[tokio::test]
    async fn server_starts_and_serves_health() {
        let db = Database::in_memory().unwrap();
        let handle = start(test_config(), db).await.unwrap();
        assert!(handle.port() > 0);

        let url = format!("http://{}/health", handle.local_addr());
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["peers"], 0);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn health_waits_for_database_off_the_runtime() {
        use std::time::{Duration, Instant};

        let db = Database::in_memory().unwrap();
        let handle = start(test_config(), db.clone()).await.unwrap();

        // Hold the connection on a plain thread so the health check has to wait.
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder = std::thread::spawn(move || {
            db.with_conn(|_conn| {
                let _ = locked_tx.send(());
                std::thread::sleep(Duration::from_millis(500));
                Ok(())
            })
            .unwrap();
        });
        locked_rx.recv().unwrap();

        let url = format!("http://{}/health", handle.local_addr());
        let (resp, timer_lag) = tokio::join!(reqwest::get(&url), async {
            let started = Instant::now();
            tokio::time::sleep(Duration::from_millis(20)).await;
            started.elapsed()
        });

        assert!(
            timer_lag < Duration::from_millis(300),
            "runtime stalled for {timer_lag:?}"
        );
        assert_eq!(resp.unwrap().status(), 200);

        holder.join().unwrap();
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn plain_get_on_ws_is_rejected() {
        let handle = start(test_config(), Database::in_memory().unwrap()).await.unwrap();

        let url = format!("http://{}/ws", handle.local_addr());
        let resp = reqwest::get(&url).await.unwrap();
        assert!(resp.status().is_client_error(), "got {}", resp.status());
        assert_eq!(handle.peer_count(), 0);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn wrong_method_is_405() {
        let handle = start(test_config(), Database::in_memory().unwrap()).await.unwrap();

        let url = format!("http://{}/login", handle.local_addr());
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 405);

        handle.shutdown().await;
    }
}
