use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::error::FlagError;
use crate::flags::FlagService;
use crate::models::*;

// ============================================================
// Error Handling
// ============================================================

/// Validation errors carry their complete detail (every offending name) back
/// to the client as structured JSON. Collaborator failures are logged
/// server-side and sanitized to a generic 500.
impl IntoResponse for FlagError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            FlagError::NotFound(name) => (
                StatusCode::NOT_FOUND,
                serde_json::json!({ "error": "Flag not found", "flag": name }),
            ),
            FlagError::AlreadyExists(name) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": "Flag already exists", "flag": name }),
            ),
            FlagError::CycleDetected(name) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": "Circular dependency detected", "flag": name }),
            ),
            FlagError::InactiveDependencies(deps) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({
                    "error": "Missing active dependencies",
                    "missing_dependencies": deps,
                }),
            ),
            FlagError::UnresolvedDependencies(deps) => (
                StatusCode::NOT_FOUND,
                serde_json::json!({
                    "error": "Unknown dependencies",
                    "unknown_dependencies": deps,
                }),
            ),
            FlagError::DependentsExist(deps) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({
                    "error": "Cannot delete flag with dependent flags",
                    "dependents": deps,
                }),
            ),
            FlagError::Store(e) => {
                tracing::error!("store error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": "Internal server error" }),
                )
            }
            FlagError::Cache(e) => {
                tracing::error!("cache error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": "Internal server error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Flags
// ============================================================

pub async fn list_flags(State(service): State<FlagService>) -> Result<Json<Vec<Flag>>, FlagError> {
    service.list().map(Json)
}

pub async fn create_flag(
    State(service): State<FlagService>,
    Json(input): Json<CreateFlagInput>,
) -> Result<(StatusCode, Json<Flag>), FlagError> {
    service
        .create(input)
        .map(|flag| (StatusCode::CREATED, Json(flag)))
}

pub async fn get_flag(
    State(service): State<FlagService>,
    Path(name): Path<String>,
) -> Result<Json<Flag>, FlagError> {
    service.get(&name).map(Json)
}

pub async fn update_flag(
    State(service): State<FlagService>,
    Path(name): Path<String>,
    Json(input): Json<UpdateFlagInput>,
) -> Result<Json<Flag>, FlagError> {
    service.update(&name, input).map(Json)
}

pub async fn toggle_flag(
    State(service): State<FlagService>,
    Path(name): Path<String>,
    Json(input): Json<ToggleFlagInput>,
) -> Result<Json<ToggleOutcome>, FlagError> {
    service.set_enabled(&name, input).map(Json)
}

/// Query parameters for flag deletion. The actor travels in the query since
/// DELETE has no body.
#[derive(Debug, Deserialize)]
pub struct DeleteFlagQuery {
    pub actor: String,
    pub reason: Option<String>,
}

pub async fn delete_flag(
    State(service): State<FlagService>,
    Path(name): Path<String>,
    Query(query): Query<DeleteFlagQuery>,
) -> Result<StatusCode, FlagError> {
    service
        .delete(&name, &query.actor, query.reason.as_deref())
        .map(|_| StatusCode::NO_CONTENT)
}

// ============================================================
// Audit log
// ============================================================

pub async fn list_audit(
    State(service): State<FlagService>,
) -> Result<Json<Vec<AuditLogEntry>>, FlagError> {
    service.audit_log().map(Json)
}

pub async fn flag_audit(
    State(service): State<FlagService>,
    Path(name): Path<String>,
) -> Result<Json<Vec<AuditLogEntry>>, FlagError> {
    service.audit_for_flag(&name).map(Json)
}
