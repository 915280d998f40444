use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};

use crate::auth::RequireAdmin;
use crate::server::AppState;
use crate::server::dto::{DashboardResponse, DeleteImageRequest, PaginationParams};
use crate::server::response::{ApiError, ApiResponse, JsonBody, NotFoundExt};

pub async fn dashboard(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let (images, stats) = state.assets.list(params.page(), params.limit())?;

    Ok::<_, ApiError>(Json(ApiResponse::success(DashboardResponse {
        stats,
        images,
    })))
}

pub async fn delete_image(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<DeleteImageRequest>,
) -> impl IntoResponse {
    state
        .assets
        .delete(req.id, &req.filename)
        .await
        .or_not_found("Image not found")?;

    tracing::info!("{} deleted image {}", admin.username, req.id);
    Ok::<_, ApiError>(Json(ApiResponse::message("Image deleted")))
}
