pub mod auth_api;
pub mod cors;
pub mod jwt;
pub mod policy;
pub mod secret;

pub use auth_api::{AuthError, AuthenticatedUser, Role};
pub use cors::{create_cors_layer, CorsConfig};
pub use jwt::{extract_bearer_token, Claims, JwtVerifier};
pub use secret::{
    secret_from_request, verify_shared_secret, INTAKE_SECRET_HEADER, WEBHOOK_SECRET_HEADER,
};
