mod backups;
mod images;
mod users;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::server::AppState;

pub fn admin_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/verify_admin", get(users::verify_admin))
        // Image routes
        .route("/dashboard", get(images::dashboard))
        .route("/delete_image", post(images::delete_image))
        // User routes
        .route("/users", get(users::list_users))
        .route("/add_user", post(users::add_user))
        .route("/edit_user", post(users::edit_user))
        .route("/delete_user", post(users::delete_user))
        // Backup routes
        .route("/create_backup", post(backups::create_backup))
        .route("/list_backups", get(backups::list_backups))
        .route("/download_backup", get(backups::download_backup))
        .route("/delete_backup", post(backups::delete_backup))
}
