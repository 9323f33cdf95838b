use axum::{
    extract::{FromRequestParts, MatchedPath},
    http::request::Parts,
};
use std::sync::Arc;
use uuid::Uuid;

use super::jwt::{TokenError, TokenVerifier, VerifiedToken};
use crate::error::ApiError;

/// Authenticated caller, extracted from `Authorization: Bearer`.
/// Route-restricted tokens are checked against the matched route template.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub token: VerifiedToken,
}

impl AuthUser {
    pub fn profile_id(&self) -> Uuid {
        self.token.recipient_id
    }
}

/// Bearer token from the Authorization header, if present.
pub fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized(TokenError::Invalid))?;

        // Verifier is placed in request extensions by the router layer
        let verifier = parts
            .extensions
            .get::<Arc<TokenVerifier>>()
            .ok_or(ApiError::Unauthorized(TokenError::Invalid))?;

        let route = parts
            .extensions
            .get::<MatchedPath>()
            .map(|path| path.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());

        let verified = verifier.verify_for(token, parts.method.as_str(), &route)?;
        Ok(AuthUser { token: verified })
    }
}
