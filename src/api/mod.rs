//! HTTP API for the garage ledger.
//!
//! JSON routes live under `/api`; realtime events stream from `/ws`.

mod cars;
mod extract;
mod mechanics;
mod punches;
mod server;
mod sessions;
mod tasks;

pub use extract::JsonBody;
pub use server::start_server;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, Method, header},
    response::IntoResponse,
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::AdminConfig;
use crate::db::Database;
use crate::error::{ServiceError, ServiceResult};
use crate::realtime::{self, Event, Notifier};

/// State shared across handlers.
pub struct AppState {
    pub db: Database,
    pub notifier: Arc<dyn Notifier>,
    pub admin: AdminConfig,
    pub allowed_origins: Vec<String>,
}

impl AppState {
    pub fn new(db: Database, notifier: Arc<dyn Notifier>, admin: AdminConfig) -> Self {
        Self {
            db,
            notifier,
            admin,
            allowed_origins: Vec::new(),
        }
    }

    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }

    /// Publish after the store call has committed.
    pub fn publish(&self, event: Event) {
        self.notifier.publish(event);
    }
}

pub type SharedState = Arc<AppState>;

/// Reject the request unless `password` matches the admin secret.
///
/// Checked before touching the store, so a refused request changes nothing.
pub(crate) fn require_admin(state: &AppState, password: Option<&str>) -> ServiceResult<()> {
    if state.admin.verify(password) {
        return Ok(());
    }
    if state.admin.password.is_none() {
        warn!("Admin action refused: no admin password configured");
    } else {
        warn!("Admin action refused: wrong password");
    }
    Err(ServiceError::unauthorized())
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn stats(State(state): State<SharedState>) -> ServiceResult<impl IntoResponse> {
    let stats = state.db.call(|db| db.get_stats()).await?;
    Ok(Json(stats))
}

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/api/health",
            "stats": "/api/stats",
            "cars": "/api/cars",
            "tasks": "/api/tasks",
            "mechanics": "/api/mechanics",
            "punches": "/api/punches",
            "realtime": "/ws",
        }
    }))
}

/// Routes mounted under `/api`.
fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .nest("/cars", cars::router())
        .nest("/tasks", tasks::router())
        .nest("/mechanics", mechanics::router())
        .nest("/punches", punches::router().merge(sessions::router()))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origins.iter().any(|allowed| allowed == origin)
        }))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
}

/// Build the router with all routes.
pub fn build_router(state: SharedState) -> Router {
    let cors = cors_layer(&state.allowed_origins);

    Router::new()
        .route("/", get(root))
        .route("/ws", get(realtime::ws_handler))
        .nest("/api", api_router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
