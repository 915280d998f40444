mod storage;

pub use storage::{AssetStorage, generate_stored_name};

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;

use crate::auth::Claims;
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Asset, AssetListing, AssetStats, NewAsset};

/// Per-file upload limit.
pub const MAX_FILE_SIZE: u64 = 2 * 1024 * 1024;
/// Files accepted in a single upload request.
pub const MAX_FILES_PER_UPLOAD: usize = 10;

const IMAGE_CONTENT_TYPE_PREFIX: &str = "image/";

/// A file received from a client, not yet validated.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub original_name: String,
    pub content_type: String,
    pub data: Bytes,
}

pub fn validate_content_type(content_type: &str) -> Result<()> {
    if content_type
        .to_ascii_lowercase()
        .starts_with(IMAGE_CONTENT_TYPE_PREFIX)
    {
        Ok(())
    } else {
        Err(Error::InvalidContentType(content_type.to_string()))
    }
}

pub fn validate_size(original_name: &str, size: u64) -> Result<()> {
    if size > MAX_FILE_SIZE {
        return Err(Error::TooLarge {
            name: original_name.to_string(),
            size,
            max: MAX_FILE_SIZE,
        });
    }
    Ok(())
}

/// Uploaded images: files under `uploads/` plus one metadata row each.
pub struct AssetStore {
    store: Arc<dyn Store>,
    storage: AssetStorage,
    strict_cleanup: bool,
}

impl AssetStore {
    pub fn new(store: Arc<dyn Store>, storage: AssetStorage, strict_cleanup: bool) -> Self {
        Self {
            store,
            storage,
            strict_cleanup,
        }
    }

    #[cfg(test)]
    pub fn storage(&self) -> &AssetStorage {
        &self.storage
    }

    /// Validates every file before touching the disk, then writes the files
    /// and records them in one transaction.
    pub async fn accept(
        &self,
        files: Vec<IncomingFile>,
        uploader: &Claims,
        client_ip: &str,
    ) -> Result<Vec<Asset>> {
        if files.is_empty() {
            return Err(Error::BadRequest("No images provided".to_string()));
        }
        if files.len() > MAX_FILES_PER_UPLOAD {
            return Err(Error::BadRequest(format!(
                "Too many files: at most {MAX_FILES_PER_UPLOAD} per upload"
            )));
        }
        for file in &files {
            validate_content_type(&file.content_type)?;
            validate_size(&file.original_name, file.data.len() as u64)?;
        }

        let mut pending = Vec::with_capacity(files.len());
        for file in &files {
            let stored_name = generate_stored_name(&file.original_name);
            if let Err(e) = self.storage.put(&stored_name, &file.data).await {
                self.discard(&pending).await;
                return Err(e);
            }
            pending.push(NewAsset {
                stored_name,
                original_name: file.original_name.clone(),
                size_bytes: file.data.len() as i64,
                uploaded_at: Utc::now(),
                uploader_ip: client_ip.to_string(),
                uploader_id: Some(uploader.principal_id),
            });
        }

        let assets = match self.store.insert_assets(&pending) {
            Ok(assets) => assets,
            Err(e) => {
                self.discard(&pending).await;
                return Err(e);
            }
        };

        tracing::info!(
            "{} uploaded {} image(s) from {}",
            uploader.username,
            assets.len(),
            client_ip
        );
        Ok(assets)
    }

    /// Best-effort removal of files whose metadata never got committed.
    async fn discard(&self, pending: &[NewAsset]) {
        for asset in pending {
            if let Err(e) = self.storage.delete(&asset.stored_name).await {
                tracing::warn!("Failed to remove orphaned upload {}: {e}", asset.stored_name);
            }
        }
    }

    /// Returns one page of assets, newest first, and totals over all assets.
    pub fn list(&self, page: i64, page_size: i64) -> Result<(Vec<AssetListing>, AssetStats)> {
        let offset = (page.max(1) - 1).saturating_mul(page_size.max(0));
        let assets = self.store.list_assets(offset, page_size)?;
        let stats = self.store.asset_stats()?;
        Ok((assets, stats))
    }

    /// Removes the metadata row, then the file. The file is only unlinked if
    /// this call removed the row, so of two racing deletes exactly one wins
    /// and the other gets `NotFound`.
    pub async fn delete(&self, id: i64, stored_name: &str) -> Result<()> {
        if !self.store.delete_asset(id, stored_name)? {
            return Err(Error::NotFound);
        }

        match self.storage.delete(stored_name).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!("Image file {stored_name} was already missing"),
            Err(e) if !self.strict_cleanup => {
                tracing::warn!("Failed to delete image file {stored_name}: {e}");
            }
            Err(e) => return Err(e),
        }

        tracing::info!("Deleted image {id} ({stored_name})");
        Ok(())
    }
}
