mod server;

pub use server::{PasswordHashConfig, ServerConfig};
