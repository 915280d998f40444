use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireAdmin;
use crate::identity::PrincipalEdit;
use crate::server::AppState;
use crate::server::dto::{
    AddUserRequest, DeleteUserRequest, EditUserRequest, PaginationParams, PrincipalResponse,
    UserStats, UsersResponse,
};
use crate::server::response::{ApiError, ApiResponse, JsonBody, NotFoundExt, blocking};

pub async fn verify_admin(_admin: RequireAdmin) -> impl IntoResponse {
    Json(ApiResponse::message("Admin verified"))
}

pub async fn list_users(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let (users, total_users) = state.identity.list(params.page(), params.limit())?;

    Ok::<_, ApiError>(Json(ApiResponse::success(UsersResponse {
        stats: UserStats { total_users },
        users,
    })))
}

pub async fn add_user(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<AddUserRequest>,
) -> impl IntoResponse {
    let user = blocking(move || state.identity.create(&req.username, &req.password, req.role))
        .await?;

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(PrincipalResponse { user })),
    ))
}

pub async fn edit_user(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<EditUserRequest>,
) -> impl IntoResponse {
    let edit = PrincipalEdit {
        id: req.id,
        username: req.username,
        password: req.password,
        role: req.role,
    };
    let user = blocking(move || state.identity.update(&edit))
        .await
        .or_not_found("User not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(PrincipalResponse { user })))
}

pub async fn delete_user(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<DeleteUserRequest>,
) -> impl IntoResponse {
    let role = state
        .identity
        .delete(req.id, admin.principal_id)
        .or_not_found("User not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::message(format!("Deleted {role} {}", req.id))))
}
