pub mod jwt;
pub mod middleware;

pub use jwt::{TokenError, TokenVerifier, ValidRoute, VerifiedToken};
pub use middleware::AuthUser;
