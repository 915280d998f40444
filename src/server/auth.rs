use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};

use crate::server::AppState;
use crate::server::dto::{LoginRequest, LoginResponse};
use crate::server::response::{ApiError, ApiResponse, JsonBody, blocking};

pub async fn login(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> impl IntoResponse {
    if req.username.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Username and password are required"));
    }

    let username = req.username.clone();
    let lookup = Arc::clone(&state);
    let principal = blocking(move || lookup.identity.authenticate(&req.username, &req.password))
        .await?
        .ok_or_else(|| {
            tracing::warn!("Failed login for '{username}'");
            ApiError::unauthorized("Invalid credentials")
        })?;

    let token = state.tokens.issue(&principal)?;
    tracing::info!("{} '{}' logged in", principal.role, principal.username);

    Ok::<_, ApiError>(Json(ApiResponse::success(LoginResponse {
        token,
        username: principal.username,
        role: principal.role,
        principal_id: principal.id,
    })))
}
