//! REST API handlers.
//!
//! Status endpoints read copies from the registry and state store; nothing
//! here holds a lock across an await of another service.

use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use ut2watch_state::{Persistence, Registration, ServerId};

use crate::ApiState;
use crate::views::{render_server, render_status};

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

// ── Status ─────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub offline: bool,
}

/// GET /api/v1/servers
///
/// Returns the bare status document; the frontend reads `groups` directly.
pub async fn list_servers(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let registrations = state.registry.registrations().await;
    let states: HashMap<_, _> = state.state.servers().await.into_iter().collect();
    Json(render_status(&registrations, &states, query.offline))
}

/// GET /api/v1/servers/{id}
pub async fn get_server(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
) -> impl IntoResponse {
    let id = ServerId(id);
    let Some(registration) = state.registry.get(id).await else {
        return error_response("server not found", StatusCode::NOT_FOUND).into_response();
    };
    let server = state.state.get(id).await;
    ApiResponse::ok(render_server(&registration, server.as_ref())).into_response()
}

// ── Registration ───────────────────────────────────────────────

/// Registration request body.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub address: String,
    #[serde(default)]
    pub group: String,
    pub token: String,
    #[serde(default)]
    pub link: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: ServerId,
}

/// POST /api/v1/register
pub async fn register_server(
    State(state): State<ApiState>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    if !state.dynamic.accepts(&req.token) {
        warn!(addr = %req.address, "registration rejected: bad token");
        return error_response("invalid registration token", StatusCode::FORBIDDEN).into_response();
    }

    let address = req.address.trim();
    if address.is_empty() {
        return error_response("address is required", StatusCode::BAD_REQUEST).into_response();
    }

    // Announcements must not downgrade a statically configured server.
    if let Some(existing) = state.registry.get_by_address(address).await {
        if !existing.is_ephemeral() {
            return error_response("address is statically configured", StatusCode::CONFLICT)
                .into_response();
        }
    }

    let mut registration = Registration::new(address, req.group.trim())
        .with_interval(state.dynamic.interval)
        .with_timeout(state.dynamic.timeout)
        .with_persistence(Persistence::Ephemeral);
    if let Some(link) = req.link.as_deref().filter(|l| !l.is_empty()) {
        registration = registration.with_external_link(link);
    }

    let id = state.registry.register(registration).await;
    info!(%id, addr = %address, group = %req.group, "dynamic server registered");
    ApiResponse::ok(RegisterResponse { id }).into_response()
}
