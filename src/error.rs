use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("not found")]
    NotFound,

    #[error("username '{0}' already exists")]
    DuplicateUsername(String),

    #[error("cannot delete your own account")]
    SelfDelete,

    #[error("invalid file type '{0}': only images are allowed")]
    InvalidContentType(String),

    #[error("file '{name}' is too large ({size} bytes, max {max} bytes)")]
    TooLarge { name: String, size: u64, max: u64 },

    #[error("invalid backup name")]
    InvalidBackupName,

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden")]
    Forbidden,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
