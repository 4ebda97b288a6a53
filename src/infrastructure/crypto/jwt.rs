//! Identity-provider token verification
//!
//! Authentication itself is delegated; the service only checks the HMAC
//! signature, expiry and (optionally) issuer of the bearer token and reads
//! the user id and email out of it.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::SecurityConfig;

/// JWT configuration
#[derive(Clone)]
pub struct JwtConfig {
    /// Secret shared with the identity provider
    pub secret: String,
    /// Expected issuer; `None` accepts any
    pub issuer: Option<String>,
}

impl From<&SecurityConfig> for JwtConfig {
    fn from(cfg: &SecurityConfig) -> Self {
        Self {
            secret: cfg.jwt_secret.clone(),
            issuer: Some(cfg.jwt_issuer.clone()).filter(|iss| !iss.is_empty()),
        }
    }
}

/// Identity token claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenClaims {
    /// Subject (user ID)
    pub sub: String,
    #[serde(default)]
    pub email: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl TokenClaims {
    pub fn new(user_id: &str, email: &str, ttl: Duration, config: &JwtConfig) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.to_string(),
            email: email.to_string(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            iss: config.issuer.clone(),
        }
    }
}

/// Sign a token. Used by tests and local tooling; production tokens come
/// from the identity provider.
pub fn create_token(
    claims: &TokenClaims,
    config: &JwtConfig,
) -> Result<String, jsonwebtoken::errors::Error> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
}

/// Verify and decode a bearer token
pub fn verify_token(
    token: &str,
    config: &JwtConfig,
) -> Result<TokenClaims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::default();
    if let Some(issuer) = &config.issuer {
        validation.set_issuer(&[issuer]);
    }

    let token_data = decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(issuer: Option<&str>) -> JwtConfig {
        JwtConfig {
            secret: "test-secret".to_string(),
            issuer: issuer.map(str::to_string),
        }
    }

    #[test]
    fn round_trips_identity_claims() {
        let cfg = config(Some("idp"));
        let claims = TokenClaims::new("user-1", "a@example.com", Duration::hours(1), &cfg);
        let token = create_token(&claims, &cfg).unwrap();

        let decoded = verify_token(&token, &cfg).unwrap();
        assert_eq!(decoded.sub, "user-1");
        assert_eq!(decoded.email, "a@example.com");
    }

    #[test]
    fn rejects_wrong_secret_and_issuer() {
        let cfg = config(Some("idp"));
        let claims = TokenClaims::new("user-1", "a@example.com", Duration::hours(1), &cfg);
        let token = create_token(&claims, &cfg).unwrap();

        let other_secret = JwtConfig {
            secret: "other".to_string(),
            ..cfg.clone()
        };
        assert!(verify_token(&token, &other_secret).is_err());
        assert!(verify_token(&token, &config(Some("someone-else"))).is_err());
    }

    #[test]
    fn rejects_expired_tokens() {
        let cfg = config(None);
        let claims = TokenClaims::new("user-1", "", Duration::hours(-2), &cfg);
        let token = create_token(&claims, &cfg).unwrap();
        assert!(verify_token(&token, &cfg).is_err());
    }
}
