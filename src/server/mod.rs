//! Web front end: upload form, generation, download.
//!
//! ## Routes
//!
//! | Method | Path                   | Handler                         |
//! |--------|------------------------|---------------------------------|
//! | GET    | `/`                    | upload form, starts a session   |
//! | POST   | `/upload`              | validate, generate, results     |
//! | GET    | `/download/:filename`  | the session's generated PDF     |
//! | GET    | `/health`              | liveness JSON                   |
//! | GET    | `/test`                | directory and API-key self-check|
//!
//! Anything else renders `Page not found.` with 404.
//!
//! Generation goes through the [`BalanceSheetEngine`] held in [`AppState`],
//! so the router can be driven in tests without pdfium or a provider.

pub mod engine;
pub mod error;
pub mod handlers;
pub mod session;
pub mod templates;

pub use engine::{BalanceSheetEngine, PipelineEngine};
pub use error::PageError;
pub use session::{Session, SessionStore, SESSION_COOKIE};

use crate::config::ServerConfig;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub sessions: SessionStore,
    pub engine: Arc<dyn BalanceSheetEngine>,
}

impl AppState {
    pub fn new(config: ServerConfig, engine: Arc<dyn BalanceSheetEngine>) -> Self {
        let sessions = SessionStore::new(Duration::from_secs(config.session_ttl_secs));
        Self {
            config: Arc::new(config),
            sessions,
            engine,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.config.session_ttl_secs)
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.body_limit();
    Router::new()
        .route("/", get(handlers::index))
        .route("/upload", post(handlers::upload))
        .route("/download/:filename", get(handlers::download))
        .route("/health", get(handlers::health))
        .route("/test", get(handlers::diagnostics))
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Create the upload and output directories, bind and serve until Ctrl-C.
pub async fn serve(config: ServerConfig, engine: Arc<dyn BalanceSheetEngine>) -> std::io::Result<()> {
    tokio::fs::create_dir_all(&config.upload_dir).await?;
    tokio::fs::create_dir_all(&config.output_dir).await?;

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let addr: SocketAddr = listener.local_addr()?;

    info!(
        %addr,
        upload_dir = %config.upload_dir.display(),
        output_dir = %config.output_dir.display(),
        max_files = config.max_files,
        max_file_size_mb = config.max_file_size_mb(),
        "Bilancio server listening"
    );

    let app = router(AppState::new(config, engine));
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Shutdown signal received");
            }
        })
        .await?;

    info!("Bilancio server stopped");
    Ok(())
}
