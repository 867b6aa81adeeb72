//! HTTP service surface.
//!
//! Three routes: `/` and `/health` report liveness plus whether a saved
//! session exists, `/scrape` runs a whole batch synchronously and returns
//! the results. Each request gets its own browser; a semaphore caps how
//! many are open at once since every one of them signs in as the same
//! account.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use tokio::sync::Semaphore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::batch::{self, CancelFlag};
use crate::browser::stealth;
use crate::core::config::Config;
use crate::core::error::ScrapeError;
use crate::core::types::{ErrorResponse, ScrapeRequest, ScrapeResponse};
use crate::pacing::RunMode;
use crate::session::SessionStore;

pub struct AppState {
    pub config: Config,
    store: SessionStore,
    browser_slots: Semaphore,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let store = SessionStore::new(config.state_file.clone());
        let browser_slots = Semaphore::new(config.max_concurrent_sessions);
        AppState {
            config,
            store,
            browser_slots,
        }
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/scrape", post(scrape_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until SIGINT/SIGTERM.
pub async fn serve(state: Arc<AppState>, port: u16) -> anyhow::Result<()> {
    let app = app(state);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Address already in use: {}. Stop the existing process or run with --port {} (or set PROFILECRAWL_PORT/PORT).",
                bind_addr,
                port.saturating_add(1)
            )
        }
        Err(e) => return Err(e.into()),
    };
    info!("profilecrawl service listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Resolves on SIGINT/SIGTERM (ctrl-c on non-unix). Shared with the CLI,
/// which uses it to arm the between-profiles cancellation flag.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).ok();
        let mut sigint = signal(SignalKind::interrupt()).ok();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                if let Some(ref mut s) = sigterm {
                    s.recv().await;
                } else {
                    futures::future::pending::<()>().await;
                }
            } => {},
            _ = async {
                if let Some(ref mut s) = sigint {
                    s.recv().await;
                } else {
                    futures::future::pending::<()>().await;
                }
            } => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "profilecrawl",
        "version": env!("CARGO_PKG_VERSION"),
        "session_saved": state.store.exists(),
        "browser_found": stealth::native_browser_available(),
    }))
}

async fn scrape_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScrapeRequest>,
) -> Result<Json<ScrapeResponse>, (StatusCode, Json<ErrorResponse>)> {
    let urls: Vec<String> = request
        .urls
        .iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect();
    if urls.is_empty() {
        return Err(bad_request("no profile URLs in request"));
    }

    let batch_id = Uuid::new_v4();
    info!("scrape[{}]: {} profile urls", batch_id, urls.len());

    let _permit = state
        .browser_slots
        .acquire()
        .await
        .map_err(|_| service_unavailable("service is shutting down"))?;

    // Service batches run to completion; there is no per-request cancel.
    let cancel = CancelFlag::new();
    match batch::run_batch(
        &state.config,
        &state.store,
        urls,
        RunMode::Service,
        &cancel,
        |_| {},
    )
    .await
    {
        Ok(outcome) => {
            info!(
                "scrape[{}]: finished {} profiles",
                batch_id,
                outcome.profiles.len()
            );
            Ok(Json(ScrapeResponse::from_profiles(outcome.profiles)))
        }
        Err(e) => {
            error!("scrape[{}]: {}", batch_id, e);
            let status = match &e {
                ScrapeError::SessionMissing { .. } => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            Err((
                status,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            ))
        }
    }
}

fn bad_request(msg: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse { error: msg.into() }),
    )
}

fn service_unavailable(msg: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse { error: msg.into() }),
    )
}
