//! # Picstash
//!
//! A small self-hosted image host: accounts with a user or admin role, image
//! uploads attributed to their uploader, an admin dashboard and zip backups
//! of the whole data directory. Usable both as a standalone binary and as a
//! library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! picstash = { version = "0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use picstash::config::ServerConfig;
//! use picstash::server::{AppState, create_router};
//! use picstash::store::{SqliteStore, Store};
//!
//! let config = ServerConfig {
//!     secret_key: Some("change-me".into()),
//!     ..ServerConfig::default()
//! };
//! let store = SqliteStore::new(config.db_path()).unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(AppState::new(&config, Arc::new(store)).unwrap());
//! let router = create_router(state);
//! // Serve with axum, using `into_make_service_with_connect_info::<SocketAddr>()`
//! // so uploads record the client address.
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `picstash` binary. Disable with `default-features = false`.

pub mod assets;
pub mod auth;
pub mod backup;
pub mod config;
pub mod error;
pub mod identity;
pub mod server;
pub mod store;
pub mod types;
