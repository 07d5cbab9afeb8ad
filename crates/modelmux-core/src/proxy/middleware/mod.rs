// Middleware module - Axum middleware

pub mod auth;

pub use auth::{admin_auth_middleware, auth_middleware, extract_api_key, AuthenticatedUser};
