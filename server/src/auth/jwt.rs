use std::path::Path;

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Load or generate the JWT signing key (256-bit random secret).
/// Key is stored as raw bytes in data_dir/jwt_secret.
pub fn load_or_generate_jwt_secret(data_dir: &str) -> Result<Vec<u8>, std::io::Error> {
    std::fs::create_dir_all(data_dir)?;
    let key_path = Path::new(data_dir).join("jwt_secret");

    if key_path.exists() {
        let key = std::fs::read(&key_path)?;
        if key.len() == 32 {
            tracing::info!("JWT signing key loaded from {}", key_path.display());
            return Ok(key);
        }
        // Invalid key file, regenerate
        tracing::warn!("JWT key file has wrong size ({}), regenerating", key.len());
    }

    let key: [u8; 32] = rand::rng().random();
    std::fs::write(&key_path, key)?;
    tracing::info!("JWT signing key generated at {}", key_path.display());
    Ok(key.to_vec())
}

/// A route a restricted token may be used on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidRoute {
    pub route: String,
    pub method: String,
}

impl ValidRoute {
    pub fn new(method: &str, route: &str) -> Self {
        Self {
            route: route.to_string(),
            method: method.to_string(),
        }
    }
}

/// Bearer token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    /// Account id
    pub sub: String,
    /// Profile id; the recipient identifier for every real-time session
    pub user_profile_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_email: Option<bool>,
    /// When present, the token is only good for these routes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_routes: Option<Vec<ValidRoute>>,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token invalid")]
    Invalid,
    #[error("token not valid for {method} {route}")]
    RouteNotAllowed { method: String, route: String },
}

/// Identity extracted from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub subject: String,
    pub recipient_id: Uuid,
    pub route_restrictions: Option<Vec<ValidRoute>>,
}

impl VerifiedToken {
    /// Check the token's route restrictions, if any, against one operation.
    pub fn authorize(&self, method: &str, route: &str) -> Result<(), TokenError> {
        let Some(routes) = &self.route_restrictions else {
            return Ok(());
        };
        let allowed = routes
            .iter()
            .any(|valid| valid.route == route && valid.method.eq_ignore_ascii_case(method));
        if allowed {
            Ok(())
        } else {
            Err(TokenError::RouteNotAllowed {
                method: method.to_string(),
                route: route.to_string(),
            })
        }
    }
}

/// Validates and mints HS256 bearer tokens. Holds only the signing secret.
#[derive(Clone)]
pub struct TokenVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier").finish_non_exhaustive()
    }
}

impl TokenVerifier {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Check signature and expiry and extract the recipient.
    pub fn verify(&self, token: &str) -> Result<VerifiedToken, TokenError> {
        let data = decode::<TokenClaims>(token, &self.decoding, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            },
        )?;
        Ok(VerifiedToken {
            subject: data.claims.sub,
            recipient_id: data.claims.user_profile_id,
            route_restrictions: data.claims.valid_routes,
        })
    }

    /// `verify` followed by the route restriction check for one operation.
    pub fn verify_for(
        &self,
        token: &str,
        method: &str,
        route: &str,
    ) -> Result<VerifiedToken, TokenError> {
        let verified = self.verify(token)?;
        verified.authorize(method, route)?;
        Ok(verified)
    }

    /// Mint a token for `recipient_id` that expires after `ttl_secs`.
    pub fn issue(
        &self,
        subject: &str,
        recipient_id: Uuid,
        valid_routes: Option<Vec<ValidRoute>>,
        ttl_secs: i64,
    ) -> Result<String, TokenError> {
        let claims = TokenClaims {
            sub: subject.to_string(),
            user_profile_id: recipient_id,
            verified_email: Some(true),
            valid_routes,
            exp: Utc::now().timestamp() + ttl_secs,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|_| TokenError::Invalid)
    }
}
