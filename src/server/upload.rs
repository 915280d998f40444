use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json,
    extract::{ConnectInfo, FromRequestParts, Multipart, State, multipart::MultipartError},
    http::request::Parts,
    response::IntoResponse,
};
use bytes::BytesMut;

use crate::assets::{IncomingFile, MAX_FILES_PER_UPLOAD, validate_content_type, validate_size};
use crate::auth::RequireAuth;
use crate::server::AppState;
use crate::server::dto::UploadResponse;
use crate::server::response::{ApiError, ApiResponse};

const UPLOAD_FIELD: &str = "images";

/// Peer address of the connection, or `"unknown"` when the server was not
/// started with connect info.
pub struct ClientIp(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(ClientIp(ip))
    }
}

fn multipart_error(err: MultipartError) -> ApiError {
    ApiError::new(err.status(), err.body_text())
}

pub async fn upload(
    RequireAuth(claims): RequireAuth,
    State(state): State<Arc<AppState>>,
    ClientIp(client_ip): ClientIp,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut files = Vec::new();

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            return Err(ApiError::bad_request(format!(
                "Unexpected field '{}'",
                field.name().unwrap_or_default()
            )));
        }
        if files.len() == MAX_FILES_PER_UPLOAD {
            return Err(ApiError::bad_request(format!(
                "Too many files: at most {MAX_FILES_PER_UPLOAD} per upload"
            )));
        }

        let original_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        validate_content_type(&content_type)?;

        // Stop reading as soon as a file crosses the limit.
        let mut data = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            data.extend_from_slice(&chunk);
            validate_size(&original_name, data.len() as u64)?;
        }

        files.push(IncomingFile {
            original_name,
            content_type,
            data: data.freeze(),
        });
    }

    let images = state.assets.accept(files, &claims, &client_ip).await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(UploadResponse { images })))
}
