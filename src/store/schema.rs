pub const SCHEMA: &str = r#"
-- Principals of both roles share one username namespace; the role column is the partition
CREATE TABLE IF NOT EXISTS principals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'user' CHECK (role IN ('user', 'admin'))
);

-- Uploaded images; files live under <data_dir>/uploads/<filename>
CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL UNIQUE,      -- server-generated stored name
    original_name TEXT NOT NULL,        -- client supplied, untrusted
    file_size INTEGER NOT NULL,
    upload_date TEXT NOT NULL,
    ip_address TEXT NOT NULL,

    -- Weak link to the uploader; cleared when the principal is deleted
    uploader_id INTEGER REFERENCES principals(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_principals_role ON principals(role);
CREATE INDEX IF NOT EXISTS idx_images_upload_date ON images(upload_date);
CREATE INDEX IF NOT EXISTS idx_images_uploader ON images(uploader_id);
"#;
