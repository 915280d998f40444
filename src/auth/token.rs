use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Principal, Role};

pub const DEFAULT_TOKEN_TTL_SECS: i64 = 60 * 60;

/// Verified token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub principal_id: i64,
    pub username: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    /// Authentication alone does not grant admin access.
    pub fn require_role(&self, role: Role) -> Result<()> {
        if self.role == role {
            Ok(())
        } else {
            Err(Error::Forbidden)
        }
    }
}

/// Issues and verifies HS256-signed, time-limited bearer tokens.
///
/// The secret is injected once at construction and never changes. There is
/// no revocation store: expiry is the only way a token stops working.
#[derive(Clone)]
pub struct TokenAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenAuthority {
    pub fn new(secret: &[u8], ttl_secs: i64) -> Result<Self> {
        if secret.is_empty() {
            return Err(Error::Config("token secret cannot be empty".to_string()));
        }
        if ttl_secs <= 0 {
            return Err(Error::Config("token ttl must be positive".to_string()));
        }

        // Expiry is checked against an explicit clock in `verify_at`.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl: Duration::seconds(ttl_secs),
        })
    }

    pub fn issue(&self, principal: &Principal) -> Result<String> {
        self.issue_at(principal, Utc::now())
    }

    pub fn issue_at(&self, principal: &Principal, now: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            principal_id: principal.id,
            username: principal.username.clone(),
            role: principal.role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| Error::Internal(format!("failed to sign token: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        self.verify_at(token, Utc::now())
    }

    /// Rejects bad signatures, malformed tokens and expired tokens alike with
    /// `Error::Unauthenticated`.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            tracing::debug!("Rejected token: {e}");
            Error::Unauthenticated
        })?;

        if now.timestamp() >= data.claims.exp {
            tracing::debug!("Rejected expired token for {}", data.claims.username);
            return Err(Error::Unauthenticated);
        }

        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority() -> TokenAuthority {
        TokenAuthority::new(b"test-secret", DEFAULT_TOKEN_TTL_SECS).unwrap()
    }

    fn alice() -> Principal {
        Principal {
            id: 3,
            username: "alice".to_string(),
            password_hash: String::new(),
            role: Role::Admin,
        }
    }

    #[test]
    fn test_issue_and_verify_carries_identity() {
        let tokens = authority();
        let token = tokens.issue(&alice()).unwrap();

        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.principal_id, 3);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.exp - claims.iat, DEFAULT_TOKEN_TTL_SECS);
    }

    #[test]
    fn test_expiry_window() {
        let tokens = authority();
        let issued = Utc::now();
        let token = tokens.issue_at(&alice(), issued).unwrap();

        assert!(tokens.verify_at(&token, issued + Duration::minutes(59)).is_ok());
        assert!(matches!(
            tokens.verify_at(&token, issued + Duration::minutes(61)),
            Err(Error::Unauthenticated)
        ));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = authority().issue(&alice()).unwrap();
        let other = TokenAuthority::new(b"another-secret", DEFAULT_TOKEN_TTL_SECS).unwrap();

        assert!(matches!(other.verify(&token), Err(Error::Unauthenticated)));
    }

    #[test]
    fn test_tampered_and_malformed_rejected() {
        let tokens = authority();
        let token = tokens.issue(&alice()).unwrap();

        let mut tampered = token.clone();
        tampered.pop();
        tampered.push(if token.ends_with('A') { 'B' } else { 'A' });

        assert!(tokens.verify(&tampered).is_err());
        assert!(tokens.verify("").is_err());
        assert!(tokens.verify("not.a.jwt").is_err());
    }

    #[test]
    fn test_require_role() {
        let tokens = authority();
        let mut bob = alice();
        bob.role = Role::User;
        let claims = tokens.verify(&tokens.issue(&bob).unwrap()).unwrap();

        assert!(claims.require_role(Role::User).is_ok());
        assert!(matches!(
            claims.require_role(Role::Admin),
            Err(Error::Forbidden)
        ));
    }

    #[test]
    fn test_rejects_empty_secret() {
        assert!(TokenAuthority::new(b"", 60).is_err());
        assert!(TokenAuthority::new(b"x", 0).is_err());
    }
}
