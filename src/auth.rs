//! JWT authentication for the relay API
//!
//! Issues and validates HS256 bearer tokens; the middleware gates every
//! conversational endpoint before any core logic runs.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::AssistantError;
use crate::Result;

/// Token lifetime handed to [`AuthState::new`] by the binary
pub const TOKEN_EXPIRY_SECS: u64 = 30 * 60;

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
}

/// Authentication state shared across requests
#[derive(Clone)]
pub struct AuthState {
    jwt_secret: Arc<String>,
    token_expiry_secs: u64,
}

impl AuthState {
    pub fn new(jwt_secret: impl Into<String>, token_expiry_secs: u64) -> Self {
        Self {
            jwt_secret: Arc::new(jwt_secret.into()),
            token_expiry_secs,
        }
    }

    /// Generate a new JWT token for a user.
    pub fn generate_token(&self, username: &str) -> Result<String> {
        let now = chrono::Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: username.to_string(),
            exp: now + self.token_expiry_secs as usize,
            iat: now,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AssistantError::Internal(format!("Failed to issue token: {}", e)))
    }

    /// Validate a JWT token and return the claims.
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| AssistantError::Auth("Could not validate credentials".to_string()))?;

        Ok(token_data.claims)
    }
}

/// Identity extracted from a validated bearer token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub username: String,
}

/// Authentication middleware.
///
/// Rejects the request with 401 before any handler runs when the bearer
/// token is missing, malformed, expired, or signed with the wrong key.
pub async fn auth_middleware(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> std::result::Result<Response, StatusCode> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header {
        Some(h) if h.starts_with("Bearer ") => &h[7..],
        _ => return Err(StatusCode::UNAUTHORIZED),
    };

    match auth_state.validate_token(token) {
        Ok(claims) => {
            request.extensions_mut().insert(AuthUser {
                username: claims.sub,
            });
            Ok(next.run(request).await)
        }
        Err(_) => Err(StatusCode::UNAUTHORIZED),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> AuthState {
        AuthState::new("test-secret-key-32-bytes-long!!", TOKEN_EXPIRY_SECS)
    }

    #[test]
    fn test_token_roundtrip() {
        let auth = test_state();
        let token = auth.generate_token("nao-operator").unwrap();
        let claims = auth.validate_token(&token).unwrap();

        assert_eq!(claims.sub, "nao-operator");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_invalid_token_rejected() {
        let auth = test_state();
        assert!(matches!(
            auth.validate_token("not-a-token"),
            Err(AssistantError::Auth(_))
        ));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let auth = test_state();
        let token = auth.generate_token("nao-operator").unwrap();

        let other = AuthState::new("a-completely-different-secret!!!", TOKEN_EXPIRY_SECS);
        assert!(other.validate_token(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let auth = test_state();
        let past = (chrono::Utc::now().timestamp() - 3600) as usize;
        let claims = Claims {
            sub: "nao-operator".to_string(),
            exp: past,
            iat: past - 60,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret("test-secret-key-32-bytes-long!!".as_bytes()),
        )
        .unwrap();

        assert!(auth.validate_token(&token).is_err());
    }
}
