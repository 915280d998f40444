use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{Error, Result};

const MAX_EXTENSION_LEN: usize = 10;

/// Image files on disk. Names are always server generated, so nothing a
/// client sends ever becomes part of a path.
pub struct AssetStorage {
    base_path: PathBuf,
    temp_path: PathBuf,
}

impl AssetStorage {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            base_path: data_dir.join("uploads"),
            temp_path: data_dir.join("tmp"),
        }
    }

    fn file_path(&self, stored_name: &str) -> Result<PathBuf> {
        validate_stored_name(stored_name)?;
        Ok(self.base_path.join(stored_name))
    }

    #[cfg(test)]
    pub async fn exists(&self, stored_name: &str) -> Result<bool> {
        let path = self.file_path(stored_name)?;
        Ok(fs::try_exists(&path).await?)
    }

    /// Writes to a temp file first and renames it into place, so a reader
    /// never sees a half-written image.
    pub async fn put(&self, stored_name: &str, data: &[u8]) -> Result<()> {
        let final_path = self.file_path(stored_name)?;

        fs::create_dir_all(&self.temp_path).await?;
        fs::create_dir_all(&self.base_path).await?;

        let temp_path = self.temp_path.join(Uuid::new_v4().to_string());
        let mut temp_file = File::create(&temp_path).await?;
        if let Err(e) = write_all_synced(&mut temp_file, data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        fs::rename(&temp_path, &final_path).await?;
        Ok(())
    }

    /// Returns `false` if the file was already gone.
    pub async fn delete(&self, stored_name: &str) -> Result<bool> {
        let path = self.file_path(stored_name)?;

        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

async fn write_all_synced(file: &mut File, data: &[u8]) -> std::io::Result<()> {
    file.write_all(data).await?;
    file.sync_all().await
}

/// Builds a unique stored name that keeps the upload's extension, lowercased.
/// Extensions that are not short and alphanumeric are dropped.
#[must_use]
pub fn generate_stored_name(original_name: &str) -> String {
    let extension = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| {
            !e.is_empty()
                && e.len() <= MAX_EXTENSION_LEN
                && e.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();

    format!("{}{extension}", Uuid::new_v4())
}

fn validate_stored_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains("..")
        && !name.contains(&['/', '\\', '\0'][..]);

    if valid {
        Ok(())
    } else {
        Err(Error::BadRequest(format!("invalid stored file name '{name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generated_name_keeps_lowercased_extension() {
        let name = generate_stored_name("Holiday.JPG");
        assert!(name.ends_with(".jpg"));
        assert_eq!(name.len(), 36 + 4);
    }

    #[test]
    fn test_generated_name_ignores_path_in_original() {
        let name = generate_stored_name("../../etc/passwd.png");
        assert!(!name.contains('/'));
        assert!(name.ends_with(".png"));

        let no_ext = generate_stored_name("README");
        assert_eq!(no_ext.len(), 36);

        let odd = generate_stored_name("evil.p/ng");
        assert!(!odd.contains('/'));
    }

    #[test]
    fn test_generated_names_are_unique() {
        assert_ne!(generate_stored_name("a.png"), generate_stored_name("a.png"));
    }

    #[tokio::test]
    async fn test_put_exists_delete() {
        let temp = TempDir::new().unwrap();
        let storage = AssetStorage::new(temp.path());

        storage.put("pic.png", b"\x89PNG").await.unwrap();
        assert!(storage.exists("pic.png").await.unwrap());
        assert_eq!(
            std::fs::read(temp.path().join("uploads/pic.png")).unwrap(),
            b"\x89PNG"
        );

        assert!(storage.delete("pic.png").await.unwrap());
        assert!(!storage.exists("pic.png").await.unwrap());
        assert!(!storage.delete("pic.png").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_traversal_names() {
        let temp = TempDir::new().unwrap();
        let storage = AssetStorage::new(temp.path());

        for bad in ["", "../secret", "a/b.png", "..\\x", ".hidden"] {
            assert!(
                matches!(storage.delete(bad).await, Err(Error::BadRequest(_))),
                "accepted {bad:?}"
            );
        }
    }
}
