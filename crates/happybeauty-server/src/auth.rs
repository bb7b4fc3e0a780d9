//! Bearer token authentication.
//!
//! Tokens are HS256 JWTs issued by the identity provider; `sub` carries the
//! user id. The core only needs "token -> user id".

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::UserProfile;
use crate::state::AppState;

/// Claims read from identity provider tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub aud: String,
    pub exp: usize,
}

/// Signs `claims` with the shared secret. Used to mint tokens for local runs
/// and tests; production tokens come from the identity provider.
pub fn encode_token(secret: &str, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Validates bearer tokens against the shared secret and audience.
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str, audience: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[audience]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// User id carried by a valid token.
    pub fn verify(&self, token: &str) -> Result<Uuid, AppError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))?;
        Uuid::parse_str(&data.claims.sub)
            .map_err(|_| AppError::Unauthorized("Token subject is not a user id".to_string()))
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))
}

/// An authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user_id = state.tokens.verify(bearer_token(parts)?)?;
        Ok(AuthUser { user_id })
    }
}

/// An authenticated caller whose profile is flagged admin.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub profile: UserProfile,
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser { user_id } = AuthUser::from_request_parts(parts, state).await?;
        let profile = state
            .ledger
            .find_profile(user_id)
            .await?
            .ok_or_else(|| AppError::Forbidden("Admin access required".to_string()))?;

        if !profile.is_admin {
            tracing::warn!(user_id = %user_id, "Non-admin attempted config access");
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        Ok(AdminUser { profile })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(sub: &str, aud: &str) -> Claims {
        Claims {
            sub: sub.to_string(),
            aud: aud.to_string(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        }
    }

    #[test]
    fn test_valid_token() {
        let user_id = Uuid::new_v4();
        let token = encode_token("secret", &claims(&user_id.to_string(), "authenticated")).unwrap();
        let verifier = TokenVerifier::new("secret", "authenticated");
        assert_eq!(verifier.verify(&token).unwrap(), user_id);
    }

    #[test]
    fn test_wrong_secret() {
        let token =
            encode_token("other", &claims(&Uuid::new_v4().to_string(), "authenticated")).unwrap();
        let verifier = TokenVerifier::new("secret", "authenticated");
        assert!(matches!(verifier.verify(&token), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn test_wrong_audience() {
        let token = encode_token("secret", &claims(&Uuid::new_v4().to_string(), "anon")).unwrap();
        let verifier = TokenVerifier::new("secret", "authenticated");
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn test_subject_must_be_uuid() {
        let token = encode_token("secret", &claims("not-a-uuid", "authenticated")).unwrap();
        let verifier = TokenVerifier::new("secret", "authenticated");
        assert!(matches!(verifier.verify(&token), Err(AppError::Unauthorized(_))));
    }
}
