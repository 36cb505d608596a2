//! Public HTTP endpoint for company search and task status.
//!
//! ## Endpoints
//!
//! - `GET /api/companies/search?name=...`: cached company lookup
//! - `GET /api/scheduler/tasks`: background task snapshots
//! - `GET /health`: liveness check

use crate::bootstrap::Core;
use crate::config::ServerConfig;
use crate::error::{Result, VigilError};
use crate::scheduler::TaskStatus;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use vigil_lookup::{CompanyFetcher, LookupError};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Query string of `GET /api/companies/search`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchParams {
    /// Free-text company name. Missing is treated as empty.
    #[serde(default)]
    pub name: Option<String>,
}

/// Error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// The error details.
    pub error: ErrorBody,
}

/// Error details within an [`ErrorResponse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable error message.
    pub message: String,
    /// Error type (`"invalid_request_error"`, `"upstream_error"`, `"server_error"`).
    #[serde(rename = "type")]
    pub error_type: String,
}

/// Response from `GET /api/scheduler/tasks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskListResponse {
    /// One snapshot per task, sorted by name.
    pub tasks: Vec<TaskStatus>,
}

/// Response from `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server answers.
    pub status: String,
}

impl ErrorResponse {
    fn new(message: impl Into<String>, error_type: &str) -> Self {
        Self {
            error: ErrorBody {
                message: message.into(),
                error_type: error_type.to_owned(),
            },
        }
    }
}

/// Status code and error type for a lookup failure.
fn classify(err: &LookupError) -> (StatusCode, &'static str) {
    match err {
        LookupError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_request_error"),
        LookupError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
        LookupError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error"),
    }
}

// ---------------------------------------------------------------------------
// SearchServer
// ---------------------------------------------------------------------------

struct AppState<F> {
    core: Arc<Core<F>>,
}

impl<F> Clone for AppState<F> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

/// HTTP server over a bootstrapped [`Core`].
///
/// Serves in a background tokio task until [`shutdown`](Self::shutdown) or
/// drop.
pub struct SearchServer {
    /// The address the server is listening on.
    addr: SocketAddr,
    /// Cancels the serve loop gracefully.
    cancel: CancellationToken,
    /// Handle to the background server task.
    handle: JoinHandle<()>,
}

impl std::fmt::Debug for SearchServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchServer")
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

/// Build the router without binding, for embedding in a larger app.
pub fn router<F: CompanyFetcher>(core: Arc<Core<F>>) -> Router {
    Router::new()
        .route("/api/companies/search", get(handle_search::<F>))
        .route("/api/scheduler/tasks", get(handle_tasks::<F>))
        .route("/health", get(handle_health))
        .with_state(AppState { core })
}

impl SearchServer {
    /// Start the HTTP server.
    ///
    /// Binds to `{config.host}:{config.port}` (use port `0` for auto-assign)
    /// and begins serving in a background tokio task.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot bind.
    pub async fn start<F: CompanyFetcher>(core: Arc<Core<F>>, config: &ServerConfig) -> Result<Self> {
        let app = router(core);

        let bind_addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| VigilError::Server(format!("bind {bind_addr} failed: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| VigilError::Server(format!("failed to get local addr: {e}")))?;

        info!("search server listening on http://{addr}");

        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                tracing::error!("search server error: {e}");
            }
        });

        Ok(Self {
            addr,
            cancel,
            handle,
        })
    }

    /// Returns the address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Err(e) = (&mut self.handle).await {
            debug!("search server task ended abnormally: {e}");
        }
        info!("search server stopped");
    }
}

impl Drop for SearchServer {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// `GET /api/companies/search`: cached company lookup.
async fn handle_search<F: CompanyFetcher>(
    State(state): State<AppState<F>>,
    Query(params): Query<SearchParams>,
) -> Response {
    let name = params.name.unwrap_or_default();
    match state.core.lookup().search(&name).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => {
            let (status, error_type) = classify(&e);
            debug!(status = status.as_u16(), error = %e, "search request failed");
            (status, Json(ErrorResponse::new(e.to_string(), error_type))).into_response()
        }
    }
}

/// `GET /api/scheduler/tasks`: background task snapshots.
async fn handle_tasks<F: CompanyFetcher>(State(state): State<AppState<F>>) -> Json<TaskListResponse> {
    Json(TaskListResponse {
        tasks: state.core.task_statuses(),
    })
}

/// `GET /health`: liveness check.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_owned(),
    })
}
