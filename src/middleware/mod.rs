pub mod auth;
pub mod admin_middleware;

pub use auth::{auth_middleware, AuthUser};
pub use admin_middleware::admin_middleware;
