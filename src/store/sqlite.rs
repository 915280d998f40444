use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use super::schema::SCHEMA;
use super::{PrincipalUpdate, Store};
use crate::error::{Error, Result};
use crate::types::*;

const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

/// SQLite-backed store. Every operation opens its own connection and drops it
/// on return, so concurrent requests never queue behind a shared handle.
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let store = Self {
            db_path: db_path.as_ref().to_path_buf(),
        };
        // Fail early on an unusable path.
        store.conn()?;
        Ok(store)
    }

    fn conn(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn principal_from_row(row: &Row<'_>) -> rusqlite::Result<Principal> {
    Ok(Principal {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        role: row.get(3)?,
    })
}

fn asset_from_row(row: &Row<'_>) -> rusqlite::Result<Asset> {
    Ok(Asset {
        id: row.get(0)?,
        stored_name: row.get(1)?,
        original_name: row.get(2)?,
        size_bytes: row.get(3)?,
        uploaded_at: parse_datetime(&row.get::<_, String>(4)?),
        uploader_ip: row.get(5)?,
        uploader_id: row.get(6)?,
    })
}

fn username_taken(conn: &Connection, username: &str, except_id: Option<i64>) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM principals WHERE username = ?1 AND (?2 IS NULL OR id != ?2)",
            params![username, except_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    // Principal operations

    fn create_principal(&self, username: &str, password_hash: &str, role: Role) -> Result<Principal> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if username_taken(&tx, username, None)? {
            return Err(Error::DuplicateUsername(username.to_string()));
        }

        let result = tx.execute(
            "INSERT INTO principals (username, password_hash, role) VALUES (?1, ?2, ?3)",
            params![username, password_hash, role],
        );

        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(Error::DuplicateUsername(username.to_string()));
            }
            Err(e) => return Err(Error::from(e)),
        }

        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(Principal {
            id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            role,
        })
    }

    fn get_principal_by_username(&self, username: &str) -> Result<Option<Principal>> {
        self.conn()?
            .query_row(
                "SELECT id, username, password_hash, role FROM principals WHERE username = ?1",
                params![username],
                principal_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_principals(&self, offset: i64, limit: i64) -> Result<Vec<Principal>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, username, password_hash, role FROM principals
             ORDER BY username, id LIMIT ?1 OFFSET ?2",
        )?;

        let rows = stmt.query_map(params![limit, offset], principal_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn count_principals(&self) -> Result<i64> {
        let count = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM principals", [], |row| row.get(0))?;
        Ok(count)
    }

    fn update_principal(&self, update: &PrincipalUpdate) -> Result<(Principal, Role)> {
        let mut conn = self.conn()?;
        // IMMEDIATE takes the write lock up front, so two concurrent edits of
        // the same principal are serialized instead of interleaving.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if username_taken(&tx, &update.username, Some(update.id))? {
            return Err(Error::DuplicateUsername(update.username.clone()));
        }

        let current = tx
            .query_row(
                "SELECT id, username, password_hash, role FROM principals WHERE id = ?1",
                params![update.id],
                principal_from_row,
            )
            .optional()?
            .ok_or(Error::NotFound)?;

        let password_hash = update
            .password_hash
            .clone()
            .unwrap_or(current.password_hash);

        let result = tx.execute(
            "UPDATE principals SET username = ?1, password_hash = ?2, role = ?3 WHERE id = ?4",
            params![update.username, password_hash, update.role, update.id],
        );

        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(Error::DuplicateUsername(update.username.clone()));
            }
            Err(e) => return Err(Error::from(e)),
        }

        tx.commit()?;

        let updated = Principal {
            id: update.id,
            username: update.username.clone(),
            password_hash,
            role: update.role,
        };
        Ok((updated, current.role))
    }

    fn delete_principal(&self, id: i64) -> Result<Option<Role>> {
        self.conn()?
            .query_row(
                "DELETE FROM principals WHERE id = ?1 RETURNING role",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(Error::from)
    }

    fn has_admin(&self) -> Result<bool> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM principals WHERE role = 'admin'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // Asset operations

    fn insert_assets(&self, assets: &[NewAsset]) -> Result<Vec<Asset>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = Vec::with_capacity(assets.len());

        // A token can outlive its principal, so the uploader is only linked
        // if it still exists.
        for asset in assets {
            let (id, uploader_id) = tx.query_row(
                "INSERT INTO images (filename, original_name, file_size, upload_date, ip_address, uploader_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, (SELECT id FROM principals WHERE id = ?6))
                 RETURNING id, uploader_id",
                params![
                    asset.stored_name,
                    asset.original_name,
                    asset.size_bytes,
                    format_datetime(&asset.uploaded_at),
                    asset.uploader_ip,
                    asset.uploader_id,
                ],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<i64>>(1)?)),
            )?;

            inserted.push(Asset {
                id,
                stored_name: asset.stored_name.clone(),
                original_name: asset.original_name.clone(),
                size_bytes: asset.size_bytes,
                uploaded_at: asset.uploaded_at,
                uploader_ip: asset.uploader_ip.clone(),
                uploader_id,
            });
        }

        tx.commit()?;
        Ok(inserted)
    }

    fn list_assets(&self, offset: i64, limit: i64) -> Result<Vec<AssetListing>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT i.id, i.filename, i.original_name, i.file_size, i.upload_date, i.ip_address, i.uploader_id,
                    CASE
                        WHEN p.id IS NULL THEN 'Guest'
                        WHEN p.role = 'admin' THEN p.username || ' (Admin)'
                        ELSE p.username
                    END AS display_name
             FROM images AS i
             LEFT JOIN principals AS p ON p.id = i.uploader_id
             ORDER BY i.upload_date DESC, i.id DESC
             LIMIT ?1 OFFSET ?2",
        )?;

        let rows = stmt.query_map(params![limit, offset], |row| {
            Ok(AssetListing {
                asset: asset_from_row(row)?,
                username: row.get(7)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn asset_stats(&self) -> Result<AssetStats> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(file_size), 0), COUNT(DISTINCT ip_address) FROM images",
            [],
            |row| {
                Ok(AssetStats {
                    total_images: row.get(0)?,
                    total_size: row.get(1)?,
                    unique_ips: row.get(2)?,
                })
            },
        )
        .map_err(Error::from)
    }

    fn delete_asset(&self, id: i64, stored_name: &str) -> Result<bool> {
        let rows = self.conn()?.execute(
            "DELETE FROM images WHERE id = ?1 AND filename = ?2",
            params![id, stored_name],
        )?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
impl SqliteStore {
    fn get_principal(&self, id: i64) -> Result<Option<Principal>> {
        self.conn()?
            .query_row(
                "SELECT id, username, password_hash, role FROM principals WHERE id = ?1",
                params![id],
                principal_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_asset(&self, id: i64) -> Result<Option<Asset>> {
        self.conn()?
            .query_row(
                "SELECT id, filename, original_name, file_size, upload_date, ip_address, uploader_id
                 FROM images WHERE id = ?1",
                params![id],
                asset_from_row,
            )
            .optional()
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn new_store(temp: &TempDir) -> SqliteStore {
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        store
    }

    fn new_asset(name: &str, size: i64, ip: &str, uploader_id: Option<i64>) -> NewAsset {
        NewAsset {
            stored_name: name.to_string(),
            original_name: format!("orig-{name}"),
            size_bytes: size,
            uploaded_at: Utc::now(),
            uploader_ip: ip.to_string(),
            uploader_id,
        }
    }

    #[test]
    fn test_initialize_creates_tables() {
        let temp = TempDir::new().unwrap();
        let store = new_store(&temp);
        // Schema is idempotent.
        store.initialize().unwrap();

        let conn = store.conn().unwrap();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"principals".to_string()));
        assert!(tables.contains(&"images".to_string()));
    }

    #[test]
    fn test_principal_crud() {
        let temp = TempDir::new().unwrap();
        let store = new_store(&temp);

        let alice = store.create_principal("alice", "hash-a", Role::Admin).unwrap();
        let bob = store.create_principal("bob", "hash-b", Role::User).unwrap();
        assert_ne!(alice.id, bob.id);

        let fetched = store.get_principal(bob.id).unwrap().unwrap();
        assert_eq!(fetched.username, "bob");
        assert_eq!(fetched.role, Role::User);

        let by_name = store.get_principal_by_username("alice").unwrap().unwrap();
        assert_eq!(by_name.id, alice.id);
        assert_eq!(by_name.password_hash, "hash-a");

        assert_eq!(store.count_principals().unwrap(), 2);
        assert!(store.has_admin().unwrap());

        assert_eq!(store.delete_principal(alice.id).unwrap(), Some(Role::Admin));
        assert_eq!(store.delete_principal(alice.id).unwrap(), None);
        assert!(!store.has_admin().unwrap());
    }

    #[test]
    fn test_duplicate_username_across_roles() {
        let temp = TempDir::new().unwrap();
        let store = new_store(&temp);

        store.create_principal("carol", "h", Role::User).unwrap();
        let result = store.create_principal("carol", "h", Role::Admin);
        assert!(matches!(result, Err(Error::DuplicateUsername(name)) if name == "carol"));
        assert_eq!(store.count_principals().unwrap(), 1);
    }

    #[test]
    fn test_list_principals_ordered_by_username() {
        let temp = TempDir::new().unwrap();
        let store = new_store(&temp);

        store.create_principal("mallory", "h", Role::User).unwrap();
        store.create_principal("alice", "h", Role::Admin).unwrap();
        store.create_principal("zed", "h", Role::Admin).unwrap();
        store.create_principal("bob", "h", Role::User).unwrap();

        let names: Vec<String> = store
            .list_principals(0, 10)
            .unwrap()
            .into_iter()
            .map(|p| p.username)
            .collect();
        assert_eq!(names, ["alice", "bob", "mallory", "zed"]);

        let page2: Vec<String> = store
            .list_principals(2, 2)
            .unwrap()
            .into_iter()
            .map(|p| p.username)
            .collect();
        assert_eq!(page2, ["mallory", "zed"]);
    }

    #[test]
    fn test_update_principal_role_change_keeps_id() {
        let temp = TempDir::new().unwrap();
        let store = new_store(&temp);
        let dave = store.create_principal("dave", "old-hash", Role::User).unwrap();

        let (updated, previous) = store
            .update_principal(&PrincipalUpdate {
                id: dave.id,
                username: "dave".to_string(),
                password_hash: None,
                role: Role::Admin,
            })
            .unwrap();

        assert_eq!(previous, Role::User);
        assert_eq!(updated.id, dave.id);
        let fetched = store.get_principal(dave.id).unwrap().unwrap();
        assert_eq!(fetched.role, Role::Admin);
        assert_eq!(fetched.password_hash, "old-hash");
    }

    #[test]
    fn test_update_principal_conflicts_and_missing() {
        let temp = TempDir::new().unwrap();
        let store = new_store(&temp);
        let erin = store.create_principal("erin", "h", Role::User).unwrap();
        store.create_principal("frank", "h", Role::Admin).unwrap();

        let rename = |username: &str, id: i64| PrincipalUpdate {
            id,
            username: username.to_string(),
            password_hash: Some("new".to_string()),
            role: Role::User,
        };

        assert!(matches!(
            store.update_principal(&rename("frank", erin.id)),
            Err(Error::DuplicateUsername(_))
        ));
        // Keeping one's own name is not a collision.
        assert!(store.update_principal(&rename("erin", erin.id)).is_ok());
        assert!(matches!(
            store.update_principal(&rename("ghost", 9999)),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn test_asset_stats_and_listing() {
        let temp = TempDir::new().unwrap();
        let store = new_store(&temp);
        let admin = store.create_principal("root", "h", Role::Admin).unwrap();
        let user = store.create_principal("bob", "h", Role::User).unwrap();

        assert_eq!(store.asset_stats().unwrap(), AssetStats::default());

        store
            .insert_assets(&[
                new_asset("a.png", 100, "10.0.0.1", Some(admin.id)),
                new_asset("b.png", 200, "10.0.0.1", Some(user.id)),
                new_asset("c.png", 300, "10.0.0.2", None),
            ])
            .unwrap();

        let stats = store.asset_stats().unwrap();
        assert_eq!(stats.total_images, 3);
        assert_eq!(stats.total_size, 600);
        assert_eq!(stats.unique_ips, 2);

        let listing = store.list_assets(0, 10).unwrap();
        let by_name = |name: &str| {
            listing
                .iter()
                .find(|l| l.asset.stored_name == name)
                .map(|l| l.username.clone())
                .unwrap()
        };
        assert_eq!(by_name("a.png"), "root (Admin)");
        assert_eq!(by_name("b.png"), "bob");
        assert_eq!(by_name("c.png"), "Guest");
    }

    #[test]
    fn test_deleting_principal_clears_uploader() {
        let temp = TempDir::new().unwrap();
        let store = new_store(&temp);
        let user = store.create_principal("bob", "h", Role::User).unwrap();

        let inserted = store
            .insert_assets(&[new_asset("x.jpg", 10, "127.0.0.1", Some(user.id))])
            .unwrap();
        store.delete_principal(user.id).unwrap();

        let asset = store.get_asset(inserted[0].id).unwrap().unwrap();
        assert_eq!(asset.uploader_id, None);
        assert_eq!(store.list_assets(0, 10).unwrap()[0].username, "Guest");
    }

    #[test]
    fn test_insert_for_missing_principal_stores_no_uploader() {
        let temp = TempDir::new().unwrap();
        let store = new_store(&temp);
        let gone = store.create_principal("eve", "h", Role::User).unwrap();
        store.delete_principal(gone.id).unwrap();

        let inserted = store
            .insert_assets(&[new_asset("z.png", 10, "127.0.0.1", Some(gone.id))])
            .unwrap();
        assert_eq!(inserted[0].uploader_id, None);

        let asset = store.get_asset(inserted[0].id).unwrap().unwrap();
        assert_eq!(asset.uploader_id, None);
        assert_eq!(store.list_assets(0, 10).unwrap()[0].username, "Guest");
    }

    #[test]
    fn test_delete_asset_requires_matching_name() {
        let temp = TempDir::new().unwrap();
        let store = new_store(&temp);
        let inserted = store
            .insert_assets(&[new_asset("y.gif", 10, "127.0.0.1", None)])
            .unwrap();
        let id = inserted[0].id;

        assert!(!store.delete_asset(id, "other.gif").unwrap());
        assert!(store.delete_asset(id, "y.gif").unwrap());
        assert!(!store.delete_asset(id, "y.gif").unwrap());
        assert!(store.get_asset(id).unwrap().is_none());
    }
}
