// Azure DevOps provider authentication - Library root

pub mod auth;
pub mod config;
pub mod env;
pub mod error;

pub use auth::{get_auth_token, select_strategy, AuthResolver};
pub use config::AuthConfig;
pub use error::{AuthError, Result};
