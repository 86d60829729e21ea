//! Bearer-token authentication for the JSON API.
//!
//! Tokens are issued by the identity provider; this module only verifies them
//! and resolves the caller's profile (role, flags, disabled state).

pub mod error;
pub mod extractor;
pub mod tests;
pub mod types;

pub use error::AuthError;
pub use types::{AuthenticatedUser, Role};
