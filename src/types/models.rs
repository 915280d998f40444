use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// The two principal partitions. A principal lives in exactly one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: i64,
    pub username: String,
    #[serde(skip)]
    pub password_hash: String,
    pub role: Role,
}

/// Metadata row for an uploaded image. Field names on the wire follow the
/// dashboard's JSON contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: i64,
    #[serde(rename = "filename")]
    pub stored_name: String,
    pub original_name: String,
    #[serde(rename = "file_size")]
    pub size_bytes: i64,
    #[serde(rename = "upload_date")]
    pub uploaded_at: DateTime<Utc>,
    #[serde(rename = "ip_address")]
    pub uploader_ip: String,
    pub uploader_id: Option<i64>,
}

/// An asset that has been written to disk but not yet recorded.
#[derive(Debug, Clone)]
pub struct NewAsset {
    pub stored_name: String,
    pub original_name: String,
    pub size_bytes: i64,
    pub uploaded_at: DateTime<Utc>,
    pub uploader_ip: String,
    pub uploader_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetListing {
    #[serde(flatten)]
    pub asset: Asset,
    /// Resolved uploader display name.
    pub username: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AssetStats {
    pub total_images: i64,
    pub total_size: i64,
    pub unique_ips: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupDescriptor {
    pub filename: String,
    pub size: u64,
    #[serde(rename = "date")]
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_str() {
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(Role::Admin.to_string(), "admin");
        assert!("Admin".parse::<Role>().is_err());
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn test_principal_never_serializes_hash() {
        let principal = Principal {
            id: 7,
            username: "alice".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            role: Role::Admin,
        };
        let json = serde_json::to_value(&principal).unwrap();
        assert_eq!(json["role"], "admin");
        assert!(json.get("password_hash").is_none());
    }
}
