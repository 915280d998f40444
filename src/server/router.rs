use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{
    Router,
    routing::{get, post},
};

use super::admin::admin_router;
use super::{auth, upload};
use crate::assets::{AssetStorage, AssetStore, MAX_FILE_SIZE, MAX_FILES_PER_UPLOAD};
use crate::auth::{CredentialHasher, TokenAuthority};
use crate::backup::BackupManager;
use crate::config::ServerConfig;
use crate::error::Result;
use crate::identity::IdentityStore;
use crate::store::Store;

/// Room for multipart boundaries and part headers on top of the file bytes.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

pub struct AppState {
    pub identity: IdentityStore,
    pub assets: AssetStore,
    pub backups: BackupManager,
    pub tokens: TokenAuthority,
}

impl AppState {
    /// Wires the domain services from a config. Fails if the signing secret
    /// or the hashing parameters are unusable.
    pub fn new(config: &ServerConfig, store: Arc<dyn Store>) -> Result<Self> {
        let hasher = CredentialHasher::new(config.password_hash)?;
        let secret = config.require_secret()?;
        let tokens = TokenAuthority::new(secret.as_bytes(), config.token_ttl_secs)?;

        Ok(Self {
            identity: IdentityStore::new(Arc::clone(&store), hasher),
            assets: AssetStore::new(
                store,
                AssetStorage::new(&config.data_dir),
                config.strict_file_cleanup,
            ),
            backups: BackupManager::new(
                config.db_path(),
                config.uploads_dir(),
                config.backups_dir(),
                config.strict_file_cleanup,
            ),
            tokens,
        })
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = MAX_FILES_PER_UPLOAD * MAX_FILE_SIZE as usize + MULTIPART_OVERHEAD;

    Router::new()
        .route("/health", get(health))
        .route("/auth/login", post(auth::login))
        .route(
            "/upload",
            post(upload::upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .nest("/admin/api", admin_router())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
