mod admin;
mod auth;
pub mod dto;
pub mod response;
mod router;
mod upload;

pub use admin::admin_router;
pub use router::{AppState, create_router};
pub use upload::ClientIp;
