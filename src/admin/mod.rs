//! Admin HTTP service — authenticated process-management endpoints, the
//! health probe, and the unauthenticated webhook restart trigger.
//!
//! Built on axum; runs as a [`Component`] with graceful shutdown wired to
//! the shared [`CancellationToken`].
//!
//! ## URL layout
//!
//! ```text
//! GET  /health                      — liveness, no auth
//! GET  /admin/server/list           — process table
//! POST /admin/server/restart        — restart by name
//! GET  /admin/server/logs           — tail log files
//! GET  /admin/pm2/server/download   — download a log file
//! GET  /admin/server/logs/stream    — live log SSE stream
//! POST /webhook                     — restart trigger, no auth
//! ```
//!
//! All `/admin/*` routes pass the api-key check first, then the fixed-window
//! rate limit.

pub mod api;
pub mod auth;
pub mod rate_limit;
pub mod stream;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Router, middleware};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{self, CorsLayer};
use tracing::{info, warn};

use crate::config::{Config, CorsOrigin};
use crate::error::AppError;
use crate::process::ProcessControl;
use crate::runtime::{Component, ComponentFuture, SubsystemHandle, spawn_components};

use rate_limit::FixedWindowLimiter;

// ── shared request state ──────────────────────────────────────────────────────

/// Router state injected into every handler. Cheap to clone — all fields are
/// reference-counted.
#[derive(Clone)]
pub struct AdminState {
    pub process: Arc<dyn ProcessControl>,
    /// Shared admin secret; `None` means the server is misconfigured and
    /// every admin request fails with a 500.
    pub api_key: Option<Arc<str>>,
    pub limiter: Arc<FixedWindowLimiter>,
    /// Environment label reported by `/health`.
    pub run_env: Arc<str>,
    /// Default process name for restart/log operations.
    pub default_app: Arc<str>,
}

impl AdminState {
    pub fn new(config: &Config, process: Arc<dyn ProcessControl>) -> Self {
        Self {
            process,
            api_key: config.api_key.as_deref().map(Arc::from),
            limiter: Arc::new(FixedWindowLimiter::new(
                config.admin.rate_limit_max,
                config.admin.rate_limit_window,
            )),
            run_env: Arc::from(config.run_env.as_str()),
            default_app: Arc::from(config.process.app_name.as_str()),
        }
    }
}

/// Uniform error envelope: `{error, detail?}` with the given status.
pub(crate) fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    detail: Option<String>,
) -> Response {
    let mut body = json!({ "error": error.into() });
    if let Some(detail) = detail {
        body["detail"] = json!(detail);
    }
    (status, Json(body)).into_response()
}

// ── router ────────────────────────────────────────────────────────────────────

pub fn build_router(state: AdminState, cors: CorsLayer) -> Router {
    let admin = Router::new()
        .route("/admin/server/list", get(api::list_processes))
        .route("/admin/server/restart", post(api::restart))
        .route("/admin/server/logs", get(api::logs))
        .route("/admin/pm2/server/download", get(api::download_log))
        .route("/admin/server/logs/stream", get(stream::logs_stream))
        // route_layer order: the last layer added runs first, so the api-key
        // check precedes the rate limiter.
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::fixed_window,
        ))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::api_key));

    Router::new()
        .route("/health", get(api::health))
        .route("/webhook", post(api::webhook))
        .merge(admin)
        .layer(cors)
        .with_state(state)
}

/// CORS: configured allow-list or wildcard, GET/POST only, the two headers
/// the admin clients send.
pub fn cors_layer(origin: &CorsOrigin) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::HeaderName::from_static("x-api-key")]);

    match origin {
        CorsOrigin::Any => layer.allow_origin(cors::Any),
        CorsOrigin::List(origins) => {
            let values: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|o| match o.parse::<HeaderValue>() {
                    Ok(v) => Some(v),
                    Err(_) => {
                        warn!(origin = %o, "ignoring unparseable CORS origin");
                        None
                    }
                })
                .collect();
            layer.allow_origin(values)
        }
    }
}

// ── server component ──────────────────────────────────────────────────────────

pub struct AdminServer {
    id: String,
    bind_addr: String,
    router: Router,
}

impl AdminServer {
    pub fn new(bind_addr: impl Into<String>, router: Router) -> Self {
        Self {
            id: "admin-http".to_string(),
            bind_addr: bind_addr.into(),
            router,
        }
    }
}

impl Component for AdminServer {
    fn id(&self) -> &str {
        &self.id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_server(self.bind_addr, self.router, shutdown))
    }
}

async fn run_server(
    bind_addr: String,
    router: Router,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AppError::Admin(format!("bind failed on {bind_addr}: {e}")))?;

    info!(%bind_addr, "admin server listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await
    .map_err(|e| AppError::Admin(format!("server error: {e}")))?;

    info!("admin server shut down");
    Ok(())
}

/// Spawn the admin server from config.
pub fn start(
    config: &Config,
    process: Arc<dyn ProcessControl>,
    shutdown: CancellationToken,
) -> SubsystemHandle {
    let state = AdminState::new(config, process);
    let router = build_router(state, cors_layer(&config.admin.cors_origin));
    let server = AdminServer::new(format!("0.0.0.0:{}", config.admin.port), router);
    spawn_components(vec![Box::new(server)], shutdown)
}
