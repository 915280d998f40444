//! Point-in-time zip snapshots of the database file and the uploads tree.

use std::fs;
use std::io::{self, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::ZipWriter;
use uuid::Uuid;
use zip::write::SimpleFileOptions;

use crate::error::{Error, Result};
use crate::types::BackupDescriptor;

const BACKUP_PREFIX: &str = "backup-";
const BACKUP_EXTENSION: &str = ".zip";
const UPLOADS_ENTRY: &str = "uploads";

pub struct BackupManager {
    db_path: PathBuf,
    uploads_dir: PathBuf,
    backups_dir: PathBuf,
    strict_cleanup: bool,
}

/// Rejects anything that could resolve outside the backups directory.
pub fn validate_backup_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains("..") || name.contains(&['/', '\\', '\0'][..]) {
        return Err(Error::InvalidBackupName);
    }
    Ok(())
}

fn backup_name(stamp: &str, n: u32) -> String {
    if n == 0 {
        format!("{BACKUP_PREFIX}{stamp}{BACKUP_EXTENSION}")
    } else {
        format!("{BACKUP_PREFIX}{stamp}-{n}{BACKUP_EXTENSION}")
    }
}

fn is_backup_file(name: &str) -> bool {
    name.ends_with(BACKUP_EXTENSION) && !name.starts_with('.')
}

impl BackupManager {
    pub fn new(
        db_path: PathBuf,
        uploads_dir: PathBuf,
        backups_dir: PathBuf,
        strict_cleanup: bool,
    ) -> Self {
        Self {
            db_path,
            uploads_dir,
            backups_dir,
            strict_cleanup,
        }
    }

    /// Writes a new archive. It only appears under its final name once it is
    /// complete, so a failed run never shows up in `list`.
    pub async fn create_snapshot(&self) -> Result<BackupDescriptor> {
        tokio::fs::create_dir_all(&self.backups_dir).await?;

        let partial_path = self
            .backups_dir
            .join(format!(".{}.partial", Uuid::new_v4()));

        let db_path = self.db_path.clone();
        let uploads_dir = self.uploads_dir.clone();
        let dest = partial_path.clone();
        let written =
            tokio::task::spawn_blocking(move || write_archive(&dest, &db_path, &uploads_dir))
                .await
                .map_err(|e| Error::Internal(format!("backup task failed: {e}")))?;

        if let Err(e) = written {
            tracing::error!("Backup failed: {e}");
            remove_partial(&partial_path).await;
            return Err(e);
        }

        let claimed = self.claim_name(&partial_path, Utc::now()).await;
        remove_partial(&partial_path).await;
        let (name, final_path) = claimed?;
        let descriptor = describe(&final_path, name)?;

        tracing::info!("Created backup {} ({} bytes)", descriptor.filename, descriptor.size);
        Ok(descriptor)
    }

    /// Links the finished archive under the first free name for `now`.
    /// `hard_link` refuses an existing target, so concurrent snapshots in the
    /// same second each get their own name.
    async fn claim_name(&self, archive: &Path, now: DateTime<Utc>) -> Result<(String, PathBuf)> {
        let stamp = now.format("%Y-%m-%dT%H-%M-%S").to_string();
        let mut n = 0;
        loop {
            let name = backup_name(&stamp, n);
            let path = self.backups_dir.join(&name);
            match tokio::fs::hard_link(archive, &path).await {
                Ok(()) => return Ok((name, path)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => n += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// All backups, newest first.
    pub fn list(&self) -> Result<Vec<BackupDescriptor>> {
        let entries = match fs::read_dir(&self.backups_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !is_backup_file(&name) || !entry.file_type()?.is_file() {
                continue;
            }
            backups.push(describe(&entry.path(), name)?);
        }

        backups.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.filename.cmp(&a.filename))
        });
        Ok(backups)
    }

    /// Opens a backup for streaming. Returns the file and its size.
    pub async fn fetch(&self, name: &str) -> Result<(tokio::fs::File, u64)> {
        let path = self.resolve(name)?;
        let file = tokio::fs::File::open(&path).await.map_err(not_found_or_io)?;
        let size = file.metadata().await?.len();
        Ok((file, size))
    }

    /// Fails with `NotFound` if the backup does not exist. Other unlink
    /// failures are only logged unless strict cleanup is configured.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let path = self.resolve(name)?;
        match tokio::fs::remove_file(&path).await.map_err(not_found_or_io) {
            Ok(()) => tracing::info!("Deleted backup {name}"),
            Err(Error::Io(e)) if !self.strict_cleanup => {
                tracing::warn!("Failed to delete backup {name}: {e}");
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        validate_backup_name(name)?;
        if !is_backup_file(name) {
            return Err(Error::NotFound);
        }
        Ok(self.backups_dir.join(name))
    }
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            tracing::warn!("Failed to remove partial backup {}: {e}", path.display());
        }
    }
}

fn not_found_or_io(e: io::Error) -> Error {
    if e.kind() == ErrorKind::NotFound {
        Error::NotFound
    } else {
        Error::Io(e)
    }
}

fn describe(path: &Path, filename: String) -> Result<BackupDescriptor> {
    let metadata = fs::metadata(path)?;
    Ok(BackupDescriptor {
        filename,
        size: metadata.len(),
        created_at: DateTime::<Utc>::from(metadata.modified()?),
    })
}

fn write_archive(dest: &Path, db_path: &Path, uploads_dir: &Path) -> Result<()> {
    let file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dest)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(9));

    let db_entry = db_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Config(format!("invalid database path {}", db_path.display())))?;
    zip.start_file(db_entry, options)?;
    io::copy(&mut fs::File::open(db_path)?, &mut zip)?;

    zip.add_directory(format!("{UPLOADS_ENTRY}/"), options)?;
    if uploads_dir.is_dir() {
        for entry in WalkDir::new(uploads_dir).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            let relative = entry
                .path()
                .strip_prefix(uploads_dir)
                .map_err(|e| Error::Internal(e.to_string()))?;
            let entry_name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if entry.file_type().is_dir() {
                zip.add_directory(format!("{UPLOADS_ENTRY}/{entry_name}/"), options)?;
            } else if entry.file_type().is_file() {
                zip.start_file(format!("{UPLOADS_ENTRY}/{entry_name}"), options)?;
                io::copy(&mut fs::File::open(entry.path())?, &mut zip)?;
            }
        }
    }

    let writer = zip.finish()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}
