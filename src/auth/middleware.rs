use std::sync::Arc;

use axum::{
    Json,
    extract::{FromRequestParts, Query},
    http::{HeaderValue, StatusCode, header::AUTHORIZATION, header::WWW_AUTHENTICATE, request::Parts},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use super::Claims;
use crate::server::AppState;
use crate::types::Role;

/// Extractor that requires any valid bearer token (user or admin).
pub struct RequireAuth(pub Claims);

/// Extractor that requires a bearer token with the admin role.
pub struct RequireAdmin(pub Claims);

/// Admin extractor for download links. Besides the Authorization header it
/// also accepts the token as a `token` query parameter, since a browser
/// following a plain link cannot set headers. Only download routes use it.
pub struct RequireAdminDownload(pub Claims);

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidScheme,
    InvalidToken,
    NotAdmin,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidScheme => (StatusCode::UNAUTHORIZED, "Invalid authorization scheme"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid or expired token"),
            AuthError::NotAdmin => (StatusCode::FORBIDDEN, "Access denied: Admin role required"),
        };

        let body = json!({ "success": false, "error": message });

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer realm=\"picstash\""),
            );
        }

        response
    }
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Pulls the raw token out of an `Authorization: Bearer` header.
/// Returns `Ok(None)` when no header is present.
pub fn extract_bearer_token(auth_header: Option<&str>) -> Result<Option<String>, AuthError> {
    match auth_header {
        Some(header) => header
            .strip_prefix("Bearer ")
            .map(|token| Some(token.trim().to_string()))
            .ok_or(AuthError::InvalidScheme),
        None => Ok(None),
    }
}

fn header_token(parts: &Parts) -> Result<Option<String>, AuthError> {
    let auth_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());
    extract_bearer_token(auth_header)
}

fn query_token(parts: &Parts) -> Option<String> {
    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(q)| q.token)
        .filter(|t| !t.is_empty())
}

fn verify(state: &AppState, raw_token: &str) -> Result<Claims, AuthError> {
    state
        .tokens
        .verify(raw_token)
        .map_err(|_| AuthError::InvalidToken)
}

fn require_admin(claims: Claims) -> Result<Claims, AuthError> {
    claims
        .require_role(Role::Admin)
        .map_err(|_| AuthError::NotAdmin)?;
    Ok(claims)
}

impl FromRequestParts<Arc<AppState>> for RequireAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let raw_token = header_token(parts)?.ok_or(AuthError::MissingAuth)?;
        Ok(RequireAuth(verify(state, &raw_token)?))
    }
}

impl FromRequestParts<Arc<AppState>> for RequireAdmin {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let raw_token = header_token(parts)?.ok_or(AuthError::MissingAuth)?;
        let claims = verify(state, &raw_token)?;
        Ok(RequireAdmin(require_admin(claims)?))
    }
}

impl FromRequestParts<Arc<AppState>> for RequireAdminDownload {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        // A non-Bearer header (a proxy's Basic credentials, say) does not
        // shadow the query token.
        let raw_token = match header_token(parts) {
            Ok(Some(token)) => token,
            header => query_token(parts).ok_or(match header {
                Err(e) => e,
                Ok(_) => AuthError::MissingAuth,
            })?,
        };

        let claims = verify(state, &raw_token)?;
        Ok(RequireAdminDownload(require_admin(claims)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(
            extract_bearer_token(Some("Bearer abc.def.ghi")).unwrap(),
            Some("abc.def.ghi".to_string())
        );
        assert_eq!(extract_bearer_token(None).unwrap(), None);
        assert!(matches!(
            extract_bearer_token(Some("Basic dXNlcjpwdw==")),
            Err(AuthError::InvalidScheme)
        ));
    }

    #[test]
    fn test_query_token() {
        let parts = |uri: &str| axum::http::Request::get(uri).body(()).unwrap().into_parts().0;

        assert_eq!(
            query_token(&parts("/download?filename=b.zip&token=abc")),
            Some("abc".to_string())
        );
        assert_eq!(query_token(&parts("/download?filename=b.zip&token=")), None);
        assert_eq!(query_token(&parts("/download")), None);
    }
}
