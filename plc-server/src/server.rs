use std::sync::Arc;

use axum::Router;
use axum::extract::Request;
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::importer;
use crate::routes;
use crate::store::{KeyspaceHandle, Store};

#[derive(Clone)]
pub struct AppState {
    /// Entries keyed per DID, in append order.
    pub ops_ks: KeyspaceHandle,
    /// Entries keyed globally by createdAt, for the export stream.
    pub log_ks: KeyspaceHandle,
    /// Import cursor and sequence counter.
    pub meta_ks: KeyspaceHandle,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn open(config: AppConfig, store: &Store) -> Result<Self, AppError> {
        Ok(Self {
            ops_ks: store.keyspace("ops")?,
            log_ks: store.keyspace("log")?,
            meta_ks: store.keyspace("meta")?,
            config: Arc::new(config),
        })
    }
}

/// The full application: routes plus tracing and the wide-open CORS layer the
/// wire contract requires (`access-control-allow-origin: *` on everything,
/// preflights answered 204).
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes::router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(middleware::from_fn(preflight_no_content))
}

/// Rewrites OPTIONS responses to 204 No Content, preflight or not.
async fn preflight_no_content(request: Request, next: Next) -> Response {
    let is_options = request.method() == Method::OPTIONS;
    let mut response = next.run(request).await;
    if is_options {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}

pub async fn run(config: AppConfig, store: Store) -> Result<(), AppError> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await.map_err(AppError::Io)?;

    let state = AppState::open(config, &store)?;

    if state.config.upstream.enabled {
        tokio::spawn(importer::run_import_loop(state.clone()));
    }

    let app = app(state);

    info!("mirror listening addr={addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(AppError::Io)?;

    info!("mirror shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT"),
        () = terminate => info!("received SIGTERM"),
    }
}
