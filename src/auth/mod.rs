mod middleware;
mod password;
mod token;

pub use middleware::{
    AuthError, RequireAdmin, RequireAdminDownload, RequireAuth, extract_bearer_token,
};
pub use password::CredentialHasher;
pub use token::{Claims, DEFAULT_TOKEN_TTL_SECS, TokenAuthority};
