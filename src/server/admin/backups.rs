use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::{Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use tokio_util::io::ReaderStream;

use crate::auth::{RequireAdmin, RequireAdminDownload};
use crate::server::AppState;
use crate::server::dto::{
    BackupListResponse, BackupNameRequest, BackupResponse, DownloadBackupParams,
};
use crate::server::response::{ApiError, ApiResponse, JsonBody, NotFoundExt};

pub async fn create_backup(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::info!("{} requested a backup", admin.username);
    let backup = state.backups.create_snapshot().await?;

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(BackupResponse { backup })),
    ))
}

pub async fn list_backups(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let backups = state.backups.list()?;

    Ok::<_, ApiError>(Json(ApiResponse::success(BackupListResponse { backups })))
}

pub async fn download_backup(
    _admin: RequireAdminDownload,
    State(state): State<Arc<AppState>>,
    Query(params): Query<DownloadBackupParams>,
) -> impl IntoResponse {
    let filename = params
        .filename
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ApiError::bad_request("Filename is required"))?;

    let (file, size) = state
        .backups
        .fetch(&filename)
        .await
        .or_not_found("Backup not found")?;

    let headers = [
        (header::CONTENT_TYPE, "application/zip".to_string()),
        (header::CONTENT_LENGTH, size.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ),
    ];

    Ok::<_, ApiError>((headers, Body::from_stream(ReaderStream::new(file))))
}

pub async fn delete_backup(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<BackupNameRequest>,
) -> impl IntoResponse {
    state
        .backups
        .delete(&req.filename)
        .await
        .or_not_found("Backup not found")?;

    tracing::info!("{} deleted backup {}", admin.username, req.filename);
    Ok::<_, ApiError>(Json(ApiResponse::message("Backup deleted")))
}
