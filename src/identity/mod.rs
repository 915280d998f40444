//! Principal management on top of the store.
//!
//! Usernames are unique across both roles. Passwords are hashed here so the
//! store only ever sees digests. Changing a principal's role keeps its id.

use std::sync::{Arc, OnceLock};

use crate::auth::CredentialHasher;
use crate::error::{Error, Result};
use crate::store::{PrincipalUpdate, Store};
use crate::types::{Principal, Role};

const MAX_USERNAME_LEN: usize = 64;
const DECOY_PASSWORD: &str = "picstash-decoy";

/// Requested changes for `IdentityStore::update`.
#[derive(Debug, Clone)]
pub struct PrincipalEdit {
    pub id: i64,
    pub username: String,
    /// `None` or empty keeps the current password.
    pub password: Option<String>,
    pub role: Role,
}

pub struct IdentityStore {
    store: Arc<dyn Store>,
    hasher: CredentialHasher,
    /// Verified against for unknown usernames so they cost as much as a wrong
    /// password.
    decoy: OnceLock<String>,
}

pub fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() {
        return Err(Error::BadRequest("Username cannot be empty".to_string()));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(Error::BadRequest(format!(
            "Username cannot exceed {MAX_USERNAME_LEN} characters"
        )));
    }
    if username.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::BadRequest(
            "Username cannot contain whitespace".to_string(),
        ));
    }
    Ok(())
}

impl IdentityStore {
    pub fn new(store: Arc<dyn Store>, hasher: CredentialHasher) -> Self {
        Self {
            store,
            hasher,
            decoy: OnceLock::new(),
        }
    }

    fn decoy_digest(&self) -> Option<&str> {
        if let Some(digest) = self.decoy.get() {
            return Some(digest);
        }
        match self.hasher.hash(DECOY_PASSWORD) {
            Ok(digest) => Some(self.decoy.get_or_init(|| digest)),
            Err(e) => {
                tracing::warn!("Failed to prepare decoy digest: {e}");
                None
            }
        }
    }

    pub fn find_by_username(&self, username: &str) -> Result<Option<Principal>> {
        self.store.get_principal_by_username(username)
    }

    /// Returns the principal if the password matches. Unknown usernames and
    /// wrong passwords are indistinguishable to the caller.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Option<Principal>> {
        let Some(principal) = self.store.get_principal_by_username(username)? else {
            if let Some(digest) = self.decoy_digest() {
                let _ = self.hasher.verify(password, digest);
            }
            return Ok(None);
        };

        if self.hasher.verify(password, &principal.password_hash) {
            Ok(Some(principal))
        } else {
            Ok(None)
        }
    }

    pub fn create(&self, username: &str, password: &str, role: Role) -> Result<Principal> {
        validate_username(username)?;
        if password.is_empty() {
            return Err(Error::BadRequest("Password cannot be empty".to_string()));
        }

        // Cheap pre-check so a duplicate does not pay for hashing; the store
        // re-checks inside its transaction.
        if self.store.get_principal_by_username(username)?.is_some() {
            return Err(Error::DuplicateUsername(username.to_string()));
        }

        let hash = self.hasher.hash(password)?;
        let principal = self.store.create_principal(username, &hash, role)?;

        tracing::info!("Created {} '{}' (id {})", role, principal.username, principal.id);
        Ok(principal)
    }

    /// Returns one page of principals (both roles, ordered by username) and
    /// the total count.
    pub fn list(&self, page: i64, page_size: i64) -> Result<(Vec<Principal>, i64)> {
        let offset = (page.max(1) - 1).saturating_mul(page_size.max(0));
        let principals = self.store.list_principals(offset, page_size)?;
        let total = self.store.count_principals()?;
        Ok((principals, total))
    }

    pub fn update(&self, edit: &PrincipalEdit) -> Result<Principal> {
        validate_username(&edit.username)?;

        let password_hash = match edit.password.as_deref() {
            Some(password) if !password.is_empty() => Some(self.hasher.hash(password)?),
            _ => None,
        };

        let (principal, previous_role) = self.store.update_principal(&PrincipalUpdate {
            id: edit.id,
            username: edit.username.clone(),
            password_hash,
            role: edit.role,
        })?;

        if previous_role != principal.role {
            tracing::info!(
                "Moved principal {} '{}' from {} to {}",
                principal.id,
                principal.username,
                previous_role,
                principal.role
            );
        } else {
            tracing::info!("Updated {} '{}' (id {})", principal.role, principal.username, principal.id);
        }

        Ok(principal)
    }

    /// Deletes a principal and returns the role it had. A principal can never
    /// delete itself, whatever its role.
    pub fn delete(&self, id: i64, requesting_id: i64) -> Result<Role> {
        if id == requesting_id {
            return Err(Error::SelfDelete);
        }

        let role = self.store.delete_principal(id)?.ok_or(Error::NotFound)?;
        tracing::info!("Deleted {} with id {}", role, id);
        Ok(role)
    }
}
