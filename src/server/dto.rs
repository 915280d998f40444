use serde::{Deserialize, Serialize};

use crate::types::{Asset, AssetListing, AssetStats, BackupDescriptor, Principal, Role};

const DEFAULT_PAGE: i64 = 1;
const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;
const MAX_PAGE: i64 = 1_000_000;

/// `?page=&limit=`. Values that are missing, unparsable or below 1 fall back
/// to the defaults. Oversized values are clamped.
#[derive(Debug, Default, Deserialize)]
pub struct PaginationParams {
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
}

fn positive(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|v| *v >= 1)
}

impl PaginationParams {
    #[must_use]
    pub fn page(&self) -> i64 {
        positive(self.page.as_deref())
            .unwrap_or(DEFAULT_PAGE)
            .min(MAX_PAGE)
    }

    #[must_use]
    pub fn limit(&self) -> i64 {
        positive(self.limit.as_deref())
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE)
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    pub role: Role,
    pub principal_id: i64,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub images: Vec<Asset>,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub stats: AssetStats,
    pub images: Vec<AssetListing>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteImageRequest {
    pub id: i64,
    pub filename: String,
}

#[derive(Debug, Serialize)]
pub struct UserStats {
    pub total_users: i64,
}

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub stats: UserStats,
    pub users: Vec<Principal>,
}

#[derive(Debug, Deserialize)]
pub struct AddUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::User
}

#[derive(Debug, Deserialize)]
pub struct EditUserRequest {
    pub id: i64,
    pub username: String,
    /// Omitted or empty keeps the current password.
    #[serde(default)]
    pub password: Option<String>,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct DeleteUserRequest {
    pub id: i64,
}

#[derive(Debug, Serialize)]
pub struct PrincipalResponse {
    pub user: Principal,
}

#[derive(Debug, Serialize)]
pub struct BackupListResponse {
    pub backups: Vec<BackupDescriptor>,
}

#[derive(Debug, Serialize)]
pub struct BackupResponse {
    pub backup: BackupDescriptor,
}

#[derive(Debug, Deserialize)]
pub struct BackupNameRequest {
    pub filename: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct DownloadBackupParams {
    #[serde(default)]
    pub filename: Option<String>,
}
