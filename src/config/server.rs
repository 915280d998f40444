use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Argon2 cost parameters used when hashing new passwords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PasswordHashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordHashConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Signing secret for bearer tokens. Required at startup.
    pub secret_key: Option<String>,
    pub token_ttl_secs: i64,
    /// When set, failing to unlink an asset or backup file fails the request
    /// instead of only being logged.
    pub strict_file_cleanup: bool,
    pub password_hash: PasswordHashConfig,
}

impl ServerConfig {
    /// Reads a TOML config file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    /// Returns the signing secret, rejecting a missing or blank one.
    pub fn require_secret(&self) -> Result<&str> {
        match self.secret_key.as_deref() {
            Some(secret) if !secret.trim().is_empty() => Ok(secret),
            _ => Err(Error::Config("secret_key is not defined".to_string())),
        }
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("picstash.db")
    }

    #[must_use]
    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    #[must_use]
    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            data_dir: PathBuf::from("./data"),
            secret_key: None,
            token_ttl_secs: 3600,
            strict_file_cleanup: false,
            password_hash: PasswordHashConfig::default(),
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("data_dir", &self.data_dir)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("strict_file_cleanup", &self.strict_file_cleanup)
            .field("password_hash", &self.password_hash)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("picstash.toml");
        std::fs::write(
            &path,
            "port = 8081\nsecret_key = \"s3cret\"\n\n[password_hash]\niterations = 3\n",
        )
        .unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.port, 8081);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.token_ttl_secs, 3600);
        assert_eq!(config.require_secret().unwrap(), "s3cret");
        assert_eq!(config.password_hash.iterations, 3);
        assert_eq!(
            config.password_hash.memory_kib,
            argon2::Params::DEFAULT_M_COST
        );
    }

    #[test]
    fn test_missing_secret_is_rejected() {
        let mut config = ServerConfig::default();
        assert!(matches!(config.require_secret(), Err(Error::Config(_))));

        config.secret_key = Some("   ".to_string());
        assert!(config.require_secret().is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = ServerConfig {
            secret_key: Some("hunter2".to_string()),
            ..ServerConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_derived_paths() {
        let config = ServerConfig {
            data_dir: PathBuf::from("/srv/picstash"),
            ..ServerConfig::default()
        };
        assert_eq!(config.db_path(), PathBuf::from("/srv/picstash/picstash.db"));
        assert_eq!(config.uploads_dir(), PathBuf::from("/srv/picstash/uploads"));
        assert_eq!(config.backups_dir(), PathBuf::from("/srv/picstash/backups"));
    }
}
