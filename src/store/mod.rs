mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// Changes applied by `Store::update_principal`.
#[derive(Debug, Clone)]
pub struct PrincipalUpdate {
    pub id: i64,
    pub username: String,
    /// New digest, or `None` to keep the current one.
    pub password_hash: Option<String>,
    pub role: Role,
}

/// Store defines the database interface.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // Principal operations
    fn create_principal(&self, username: &str, password_hash: &str, role: Role) -> Result<Principal>;
    fn get_principal_by_username(&self, username: &str) -> Result<Option<Principal>>;
    fn list_principals(&self, offset: i64, limit: i64) -> Result<Vec<Principal>>;
    fn count_principals(&self) -> Result<i64>;
    /// Applies the update atomically and returns the updated principal along
    /// with the role it had before.
    fn update_principal(&self, update: &PrincipalUpdate) -> Result<(Principal, Role)>;
    /// Returns the role the deleted principal had, or `None` if no row matched.
    fn delete_principal(&self, id: i64) -> Result<Option<Role>>;
    fn has_admin(&self) -> Result<bool>;

    // Asset operations
    fn insert_assets(&self, assets: &[NewAsset]) -> Result<Vec<Asset>>;
    fn list_assets(&self, offset: i64, limit: i64) -> Result<Vec<AssetListing>>;
    fn asset_stats(&self) -> Result<AssetStats>;
    /// Deletes the row only if both id and stored name match.
    fn delete_asset(&self, id: i64, stored_name: &str) -> Result<bool>;
}
