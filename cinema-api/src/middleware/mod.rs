pub mod auth;

pub use auth::{admin_only, auth_middleware, Claims};
