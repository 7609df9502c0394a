//! ut2watch-api — REST API for ut2watch.
//!
//! Read-only views over the registry and state store, plus token-guarded
//! runtime registration for game servers that announce themselves.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/servers` | Online servers grouped by group (`?offline=true` for all) |
//! | GET | `/api/v1/servers/{id}` | One server |
//! | POST | `/api/v1/register` | Register an ephemeral server |
//! | GET | `/*` | Static frontend, when a root directory is given |

pub mod handlers;
pub mod views;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use tower_http::services::ServeDir;
use ut2watch_state::{DEFAULT_INTERVAL, DEFAULT_TIMEOUT, Registry, StateStore};

/// Settings for `POST /api/v1/register`.
#[derive(Debug, Clone)]
pub struct DynamicRegistration {
    /// Accepted tokens. Empty rejects every request.
    pub tokens: Vec<String>,
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for DynamicRegistration {
    fn default() -> Self {
        Self {
            tokens: Vec::new(),
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl DynamicRegistration {
    pub fn accepts(&self, token: &str) -> bool {
        !token.is_empty() && self.tokens.iter().any(|t| t == token)
    }
}

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<Registry>,
    pub state: Arc<StateStore>,
    pub dynamic: Arc<DynamicRegistration>,
}

impl ApiState {
    pub fn new(registry: Arc<Registry>, state: Arc<StateStore>) -> Self {
        Self {
            registry,
            state,
            dynamic: Arc::new(DynamicRegistration::default()),
        }
    }

    pub fn with_dynamic(mut self, dynamic: DynamicRegistration) -> Self {
        self.dynamic = Arc::new(dynamic);
        self
    }
}

/// Build the complete router. `frontend` serves static files for any path
/// outside `/api/v1`.
pub fn build_router(state: ApiState, frontend: Option<&Path>) -> Router {
    let api_routes = Router::new()
        .route("/servers", get(handlers::list_servers))
        .route("/servers/{id}", get(handlers::get_server))
        .route("/register", post(handlers::register_server))
        .with_state(state);

    let router = Router::new().nest("/api/v1", api_routes);
    match frontend {
        Some(root) => router.fallback_service(ServeDir::new(root)),
        None => router,
    }
}
